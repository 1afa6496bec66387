use crate::error::StorageError;
use crate::{
    BOUNDS_COLUMN, DIRECTED_COLUMN, GLOBALS, ID_COLUMN, LINKS, PATCHES, RANDOM_STATE,
    TICKS_COLUMN, TURTLES,
};
use logoworld_core::{AgentError, Layout, Value, World};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

fn write_cells<W: Write, S: AsRef<str>>(out: &mut W, cells: &[S]) -> Result<(), StorageError> {
    for (index, cell) in cells.iter().enumerate() {
        if index > 0 {
            out.write_all(b"\t")?;
        }
        out.write_all(cell.as_ref().as_bytes())?;
    }
    out.write_all(b"\n")?;
    Ok(())
}

/// Cells for one agent in header order; names the agent's layout lacks stay empty.
fn agent_cells(
    names: &[String],
    layout: &Layout,
    read: impl Fn(usize) -> Result<Value, AgentError>,
) -> Result<Vec<String>, StorageError> {
    names
        .iter()
        .map(|name| match layout.index_of(name) {
            Some(index) => Ok(serde_json::to_string(&read(index)?)?),
            None => Ok(String::new()),
        })
        .collect()
}

/// Writes every global, turtle, patch and link of `world` to `out`.
pub fn export_world<W: Write>(world: &World, mut out: W) -> Result<(), StorageError> {
    let schema = world.schema();

    writeln!(out, "{RANDOM_STATE}")?;
    writeln!(out, "{}", serde_json::to_string(&world.random_state())?)?;

    writeln!(out, "{GLOBALS}")?;
    let mut header = vec![BOUNDS_COLUMN.to_owned(), TICKS_COLUMN.to_owned()];
    header.extend(schema.globals().names().iter().cloned());
    write_cells(&mut out, &header)?;
    let mut row = vec![
        serde_json::to_string(world.bounds())?,
        serde_json::to_string(&world.ticks())?,
    ];
    for value in world.observer().globals() {
        row.push(serde_json::to_string(value)?);
    }
    write_cells(&mut out, &row)?;

    writeln!(out, "{TURTLES}")?;
    let names = schema.all_turtle_names();
    write_cells(&mut out, &names)?;
    for turtle in world.turtles() {
        let layout = schema
            .turtles(turtle.breed())
            .ok_or_else(|| AgentError::NoSuchBreed(turtle.breed().to_owned()))?;
        let cells = agent_cells(&names, layout, |index| {
            world.turtle_variable(turtle.id(), index)
        })?;
        write_cells(&mut out, &cells)?;
    }

    writeln!(out, "{PATCHES}")?;
    let layout = schema.patches();
    write_cells(&mut out, layout.names())?;
    for patch in 0..world.patch_count() {
        let cells = agent_cells(layout.names(), layout, |index| {
            world.patch_variable(patch, index)
        })?;
        write_cells(&mut out, &cells)?;
    }

    writeln!(out, "{LINKS}")?;
    let names = schema.all_link_names();
    let mut header = vec![ID_COLUMN.to_owned(), DIRECTED_COLUMN.to_owned()];
    header.extend(names.iter().cloned());
    write_cells(&mut out, &header)?;
    for link in world.links() {
        let layout = schema
            .links(link.breed())
            .ok_or_else(|| AgentError::NoSuchBreed(link.breed().to_owned()))?;
        let mut cells = vec![
            serde_json::to_string(&link.id())?,
            serde_json::to_string(&link.is_directed())?,
        ];
        cells.extend(agent_cells(&names, layout, |index| {
            world.link_variable(link.id(), index)
        })?);
        write_cells(&mut out, &cells)?;
    }

    info!(
        turtles = world.turtle_count(),
        patches = world.patch_count(),
        links = world.link_count(),
        "world exported"
    );
    Ok(())
}

/// Exports `world` to a file at `path`, replacing it.
pub fn save_world(world: &World, path: impl AsRef<Path>) -> Result<(), StorageError> {
    let mut out = BufWriter::new(File::create(path)?);
    export_world(world, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use logoworld_core::{Program, RandomState, WorldConfig};

    #[test]
    fn sections_appear_in_order_with_one_row_per_agent() {
        let program = Program::new()
            .with_globals(["rain"])
            .with_breed("sheep", "a-sheep", ["wool"]);
        let mut world = World::with_program(WorldConfig::centered(1, 1, true).with_seed(4), program)
            .expect("world");
        world.create_turtles(2, "turtles").expect("turtles");
        world.create_turtles(1, "sheep").expect("sheep");
        world.create_link_with(0, 1, "links").expect("link");

        let mut out = Vec::new();
        export_world(&world, &mut out).expect("export");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], RANDOM_STATE);
        let state: RandomState = serde_json::from_str(lines[1]).expect("random state");
        assert_eq!(state, world.random_state());
        assert_eq!(state.seed, 4);
        assert_eq!(lines[2], GLOBALS);
        assert_eq!(lines[3], "BOUNDS\tTICKS\tRAIN");
        assert_eq!(lines[5], TURTLES);
        assert!(lines[6].starts_with("WHO\tCOLOR\tHEADING"));
        assert!(lines[6].ends_with("\tWOOL"));
        // unbred turtles leave the sheep column empty
        assert!(lines[7].ends_with('\t'));
        assert!(!lines[9].ends_with('\t'));
        assert_eq!(lines[10], PATCHES);
        assert_eq!(lines[21], LINKS);
        assert!(lines[22].starts_with("ID\tDIRECTED?\tEND1\tEND2"));
        assert_eq!(lines.len(), 24);
    }
}
