use crate::error::StorageError;
use crate::{
    BOUNDS_COLUMN, DIRECTED_COLUMN, GLOBALS, ID_COLUMN, LINKS, PATCHES, RANDOM_STATE,
    TICKS_COLUMN, TURTLES,
};
use logoworld_core::{AgentRef, RandomState, Value, World, WorldBounds};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Number of agents an import recreated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub turtles: usize,
    pub patches: usize,
    pub links: usize,
}

/// Line reader that tracks 1-based line numbers and skips blank lines.
struct Lines<R> {
    inner: std::io::Lines<R>,
    number: usize,
    peeked: Option<(usize, String)>,
}

impl<R: BufRead> Lines<R> {
    fn new(input: R) -> Self {
        Self {
            inner: input.lines(),
            number: 0,
            peeked: None,
        }
    }

    fn next(&mut self) -> Result<Option<(usize, String)>, StorageError> {
        if let Some(line) = self.peeked.take() {
            return Ok(Some(line));
        }
        for line in self.inner.by_ref() {
            self.number += 1;
            let line = line?;
            if !line.trim().is_empty() {
                return Ok(Some((self.number, line)));
            }
        }
        Ok(None)
    }

    fn peek(&mut self) -> Result<Option<&str>, StorageError> {
        if self.peeked.is_none() {
            self.peeked = self.next()?;
        }
        Ok(self.peeked.as_ref().map(|(_, line)| line.as_str()))
    }

    fn required(&mut self, what: &str) -> Result<(usize, String), StorageError> {
        self.next()?.ok_or_else(|| {
            StorageError::format(self.number + 1, format!("expected {what}, found end of input"))
        })
    }

    fn section(&mut self, name: &str) -> Result<(), StorageError> {
        let (line, text) = self.required(name)?;
        if text.trim() == name {
            Ok(())
        } else {
            Err(StorageError::format(
                line,
                format!("expected section {name}, found {text:?}"),
            ))
        }
    }

    fn header(&mut self, section: &str) -> Result<Vec<String>, StorageError> {
        let (_, text) = self.required(&format!("{section} header"))?;
        Ok(text.split('\t').map(|name| name.trim().to_uppercase()).collect())
    }

    /// Rows up to the next section title, or to the end of input when `until` is `None`.
    fn row(
        &mut self,
        header: &[String],
        until: Option<&str>,
    ) -> Result<Option<Row>, StorageError> {
        match (self.peek()?, until) {
            (None, _) => return Ok(None),
            (Some(line), Some(next)) if line.trim() == next => return Ok(None),
            _ => {}
        }
        let Some((line, text)) = self.next()? else {
            return Ok(None);
        };
        let cells: Vec<String> = text.split('\t').map(str::to_owned).collect();
        if cells.len() != header.len() {
            return Err(StorageError::format(
                line,
                format!("expected {} cells, found {}", header.len(), cells.len()),
            ));
        }
        Ok(Some(Row { line, cells }))
    }
}

struct Row {
    line: usize,
    cells: Vec<String>,
}

impl Row {
    fn parse<T: DeserializeOwned>(&self, index: usize) -> Result<T, StorageError> {
        let cell = &self.cells[index];
        serde_json::from_str(cell).map_err(|err| {
            StorageError::format(self.line, format!("bad cell {}: {err}", index + 1))
        })
    }

    /// Value in column `index`, or `None` when the cell is empty.
    fn value(&self, index: usize) -> Result<Option<Value>, StorageError> {
        if self.cells[index].trim().is_empty() {
            Ok(None)
        } else {
            self.parse(index).map(Some)
        }
    }

    fn id(&self, index: usize, what: &str) -> Result<i64, StorageError> {
        match self.value(index)? {
            Some(Value::Number(n)) if n.fract() == 0.0 && n >= 0.0 && n < i64::MAX as f64 => {
                Ok(n as i64)
            }
            Some(Value::Agent(AgentRef::Turtle(id) | AgentRef::Link(id))) => Ok(id),
            other => Err(StorageError::format(
                self.line,
                format!("{what} must be an id, found {other:?}"),
            )),
        }
    }
}

fn column(header: &[String], name: &str, line: usize) -> Result<usize, StorageError> {
    header
        .iter()
        .position(|candidate| candidate == name)
        .ok_or_else(|| StorageError::format(line, format!("missing {name} column")))
}

/// Clears `world` and rebuilds it from an export.
///
/// `world` must have been built from a program declaring the exported breeds and
/// variables. Turtles and links are recreated under their recorded ids in whatever
/// order they appear, and the next-id counters end up past the largest id seen.
pub fn import_world<R: BufRead>(world: &mut World, input: R) -> Result<ImportSummary, StorageError> {
    let mut lines = Lines::new(input);
    let mut summary = ImportSummary::default();

    lines.section(RANDOM_STATE)?;
    let (line, text) = lines.required("random state")?;
    let random_state: RandomState = serde_json::from_str(text.trim())
        .map_err(|err| StorageError::format(line, format!("bad random state: {err}")))?;

    lines.section(GLOBALS)?;
    let header = lines.header(GLOBALS)?;
    let row = lines
        .row(&header, Some(TURTLES))?
        .ok_or_else(|| StorageError::format(lines.number, "missing globals row"))?;
    let bounds: WorldBounds = row.parse(column(&header, BOUNDS_COLUMN, row.line)?)?;
    let ticks: Option<f64> = row.parse(column(&header, TICKS_COLUMN, row.line)?)?;

    world.clear_all();
    if bounds != *world.bounds() {
        world.resize(bounds)?;
    }
    if let Some(ticks) = ticks {
        world.reset_ticks();
        world.tick_advance(ticks)?;
    }
    for (index, name) in header.iter().enumerate() {
        if name == BOUNDS_COLUMN || name == TICKS_COLUMN {
            continue;
        }
        let Some(value) = row.value(index)? else {
            continue;
        };
        if world.schema().globals().index_of(name).is_none() {
            warn!(%name, "skipping global the program does not declare");
            continue;
        }
        world.set_variable(AgentRef::Observer, name, value)?;
    }

    lines.section(TURTLES)?;
    let header = lines.header(TURTLES)?;
    let who = column(&header, "WHO", lines.number)?;
    let breed = header.iter().position(|name| name == "BREED");
    let known = world.schema().all_turtle_names();
    while let Some(row) = lines.row(&header, Some(PATCHES))? {
        let id = world.get_or_create_turtle(row.id(who, "WHO")?)?;
        let agent = AgentRef::Turtle(id);
        // The breed decides which other columns apply.
        if let Some(value) = breed.map(|breed| row.value(breed)).transpose()?.flatten() {
            world.set_variable(agent, "BREED", value)?;
        }
        for (index, name) in header.iter().enumerate() {
            if index == who || Some(index) == breed || !known.contains(name) {
                continue;
            }
            if let Some(value) = row.value(index)? {
                world.set_variable(agent, name, value)?;
            }
        }
        summary.turtles += 1;
    }

    lines.section(PATCHES)?;
    let header = lines.header(PATCHES)?;
    let pxcor = column(&header, "PXCOR", lines.number)?;
    let pycor = column(&header, "PYCOR", lines.number)?;
    let mut patch = 0;
    while let Some(row) = lines.row(&header, Some(LINKS))? {
        let found = world.patch(patch).map_err(|_| {
            StorageError::format(row.line, "more patch rows than the world has patches")
        })?;
        let expected = (
            Value::Number(f64::from(found.pxcor())),
            Value::Number(f64::from(found.pycor())),
        );
        if (row.value(pxcor)?, row.value(pycor)?) != (Some(expected.0), Some(expected.1)) {
            return Err(StorageError::format(
                row.line,
                format!("patch rows out of order at patch {patch}"),
            ));
        }
        for (index, name) in header.iter().enumerate() {
            if matches!(name.as_str(), "PXCOR" | "PYCOR" | "PZCOR") {
                continue;
            }
            if let Some(value) = row.value(index)? {
                world.set_variable(AgentRef::Patch(patch), name, value)?;
            }
        }
        patch += 1;
    }
    summary.patches = patch;

    lines.section(LINKS)?;
    let header = lines.header(LINKS)?;
    let id_column = column(&header, ID_COLUMN, lines.number)?;
    let directed = column(&header, DIRECTED_COLUMN, lines.number)?;
    let end1 = column(&header, "END1", lines.number)?;
    let end2 = column(&header, "END2", lines.number)?;
    let breed = column(&header, "BREED", lines.number)?;
    let known = world.schema().all_link_names();
    while let Some(row) = lines.row(&header, None)? {
        let breed_name = match row.value(breed)? {
            Some(Value::Breed(name) | Value::Str(name)) => name,
            other => {
                return Err(StorageError::format(
                    row.line,
                    format!("link breed must be a breed name, found {other:?}"),
                ));
            }
        };
        let id = world.restore_link(
            row.parse(id_column)?,
            row.id(end1, "END1")?,
            row.id(end2, "END2")?,
            &breed_name,
            row.parse(directed)?,
        )?;
        for (index, name) in header.iter().enumerate() {
            if [id_column, directed, end1, end2, breed].contains(&index) || !known.contains(name) {
                continue;
            }
            if let Some(value) = row.value(index)? {
                world.set_variable(AgentRef::Link(id), name, value)?;
            }
        }
        summary.links += 1;
    }
    // Rebuilding agents may draw from the stream, so it is restored last.
    world.restore_random_state(random_state);

    info!(
        turtles = summary.turtles,
        patches = summary.patches,
        links = summary.links,
        seed = random_state.seed,
        "world imported"
    );
    Ok(summary)
}

/// Imports the export stored at `path` into `world`.
pub fn load_world(world: &mut World, path: impl AsRef<Path>) -> Result<ImportSummary, StorageError> {
    import_world(world, BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logoworld_core::WorldConfig;

    fn world() -> World {
        World::new(WorldConfig::centered(1, 1, true).with_seed(1)).expect("world")
    }

    #[test]
    fn a_missing_section_names_the_line() {
        let text = "RANDOM STATE\n{\"seed\":7,\"word_pos\":0}\nTURTLES\n";
        let err = import_world(&mut world(), text.as_bytes()).expect_err("no globals");
        assert!(matches!(err, StorageError::Format { line: 3, .. }), "{err}");
    }

    #[test]
    fn a_short_row_is_rejected() {
        let text = "RANDOM STATE\n{\"seed\":7,\"word_pos\":0}\n\nGLOBALS\nBOUNDS\tTICKS\n{\"min_pxcor\":-1}\n";
        let err = import_world(&mut world(), text.as_bytes()).expect_err("short row");
        assert!(matches!(err, StorageError::Format { line: 6, .. }), "{err}");
    }

    #[test]
    fn a_bad_random_state_is_a_format_error() {
        let err = import_world(&mut world(), "RANDOM STATE\n7\n".as_bytes())
            .expect_err("bare seed");
        assert!(matches!(err, StorageError::Format { line: 2, .. }), "{err}");
    }
}
