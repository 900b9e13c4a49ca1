//! Bulk ingestion, sequential retrieval and export of entities.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use retriever_api::{JsonFetcher, RetrieverClient};
use serde_json::Value;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::config::EntityConfiguration;
use crate::delay::PolitenessDelay;
use crate::entity::{Entity, EntityState};
use crate::error::{EngineError, EngineResult, TableError};
use crate::table::{self, InputRow, TableWriter};

/// Counts of one [`EntityCollection::retrieve_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalSummary {
    pub attempted: usize,
    /// Entities whose response was received and extracted, including those a
    /// post-request callback later excluded.
    pub retrieved: usize,
    pub failed: usize,
    pub excluded: usize,
}

/// Counts of one export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Insertion-ordered entities sharing one configuration and one HTTP
/// session.
///
/// The collection owns an `entity_collection` tracing span; every per-entity
/// operation is recorded inside it.
pub struct EntityCollection {
    configuration: Arc<EntityConfiguration>,
    entities: Vec<Entity>,
    seen_keys: HashSet<Vec<String>>,
    fetcher: Arc<dyn JsonFetcher>,
    delay: PolitenessDelay,
    span: Span,
}

enum CellSource<'a> {
    Input(&'a str),
    Output(Option<&'a Value>),
}

struct PreparedRow<'a> {
    label: String,
    cells: Vec<CellSource<'a>>,
}

impl EntityCollection {
    /// Create a collection backed by a real HTTP session.
    pub fn new(configuration: EntityConfiguration) -> EngineResult<Self> {
        let client =
            RetrieverClient::new(configuration.timeout).map_err(|error| EngineError::HttpClient(format!("{error:#}")))?;
        Ok(Self::with_fetcher(configuration, Arc::new(client)))
    }

    /// Create a collection backed by any [`JsonFetcher`].
    pub fn with_fetcher(configuration: EntityConfiguration, fetcher: Arc<dyn JsonFetcher>) -> Self {
        let span = info_span!("entity_collection", name = %configuration.name);
        let delay = PolitenessDelay::new(configuration.delay);
        Self {
            configuration: Arc::new(configuration),
            entities: Vec::new(),
            seen_keys: HashSet::new(),
            fetcher,
            delay,
            span,
        }
    }

    pub fn configuration(&self) -> &Arc<EntityConfiguration> {
        &self.configuration
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Build an entity of this collection's type without adding it.
    pub fn create_entity<I, K, V>(&self, values: I) -> EngineResult<Entity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.span
            .in_scope(|| Entity::new(Arc::clone(&self.configuration), values))
    }

    /// Append an entity. With `ignore_duplicates` set, an entity whose input
    /// parameters equal those of an earlier one is dropped and `false` is
    /// returned.
    pub fn push(&mut self, entity: Entity) -> bool {
        if self.configuration.ignore_duplicates && !self.seen_keys.insert(entity.key()) {
            self.span.in_scope(|| debug!(entity = %entity, "duplicate entity ignored"));
            return false;
        }
        self.entities.push(entity);
        true
    }

    /// Build entities from parsed input rows; returns how many were added.
    pub fn load_rows(&mut self, rows: Vec<InputRow>) -> EngineResult<usize> {
        let mut added = 0;
        for row in rows {
            let mut entity = self.create_entity(row.inputs)?;
            for (parameter, expected) in row.validations {
                entity.set_validation(parameter, expected);
            }
            if self.push(entity) {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn load_from_table<R: Read>(&mut self, reader: R, delimiter: u8) -> EngineResult<usize> {
        let rows = table::read_input_rows(reader, delimiter, &self.configuration)?;
        self.import_rows(rows)
    }

    pub fn load_from_path(&mut self, path: impl AsRef<Path>, delimiter: u8) -> EngineResult<usize> {
        let path = path.as_ref();
        self.span
            .in_scope(|| info!(path = %path.display(), "reading entities"));
        let rows = table::read_input_rows_from_path(path, delimiter, &self.configuration)?;
        self.import_rows(rows)
    }

    fn import_rows(&mut self, rows: Vec<InputRow>) -> EngineResult<usize> {
        let added = self.load_rows(rows)?;
        self.span.in_scope(|| info!(count = added, "entities have been imported"));
        Ok(added)
    }

    /// Retrieve every entity that has not been retrieved yet, one at a time in
    /// insertion order.
    pub async fn retrieve_all(&mut self) -> EngineResult<RetrievalSummary> {
        let span = self.span.clone();
        self.retrieve_sequentially().instrument(span).await
    }

    async fn retrieve_sequentially(&mut self) -> EngineResult<RetrievalSummary> {
        let mut summary = RetrievalSummary::default();
        for entity in &mut self.entities {
            if entity.state() != EntityState::Created {
                debug!(entity = %entity, state = ?entity.state(), "entity already processed");
                continue;
            }
            summary.attempted += 1;
            match entity.retrieve_data(self.fetcher.as_ref(), &self.delay).await? {
                EntityState::Succeeded => summary.retrieved += 1,
                EntityState::Excluded => {
                    summary.retrieved += 1;
                    summary.excluded += 1;
                }
                _ => summary.failed += 1,
            }
        }
        info!(
            attempted = summary.attempted,
            retrieved = summary.retrieved,
            failed = summary.failed,
            excluded = summary.excluded,
            "data for {} entities has been retrieved",
            summary.retrieved
        );
        Ok(summary)
    }

    /// Path of the exported table inside `directory`.
    pub fn export_path(&self, directory: impl AsRef<Path>) -> PathBuf {
        directory.as_ref().join(format!("{}.csv", self.configuration.name))
    }

    /// Write `<directory>/<name>.csv`, creating the directory if needed.
    pub fn export_to_dir(&self, directory: impl AsRef<Path>, delimiter: u8) -> EngineResult<ExportSummary> {
        let directory = directory.as_ref();
        let rows = self.prepare_rows()?;

        fs::create_dir_all(directory).map_err(TableError::from)?;
        let path = self.export_path(directory);
        self.span
            .in_scope(|| info!(path = %path.display(), "writing entities"));
        let writer = TableWriter::create(&path, delimiter, &self.configuration.export_columns())?;
        self.write_rows(writer, rows)
    }

    /// Write the exported table to any writer.
    ///
    /// # Errors
    /// [`EngineError::MissingExportColumn`] when an exportable entity lacks a
    /// configured column; nothing is written in that case.
    pub fn export_to_table<W: Write>(&self, writer: W, delimiter: u8) -> EngineResult<ExportSummary> {
        let rows = self.prepare_rows()?;
        let writer = TableWriter::new(writer, delimiter, &self.configuration.export_columns())?;
        self.write_rows(writer, rows)
    }

    fn prepare_rows(&self) -> EngineResult<Vec<PreparedRow<'_>>> {
        let columns = self.configuration.export_columns();
        self.entities
            .iter()
            .filter(|entity| entity.state().is_exportable())
            .map(|entity| {
                let cells = columns
                    .iter()
                    .map(|column| {
                        if let Some(value) = entity.input(column) {
                            Ok(CellSource::Input(value))
                        } else if let Some(value) = entity.output_parameters().get(column) {
                            Ok(CellSource::Output(value.as_ref()))
                        } else {
                            Err(EngineError::MissingExportColumn {
                                entity: entity.to_string(),
                                column: column.clone(),
                            })
                        }
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(PreparedRow {
                    label: entity.to_string(),
                    cells,
                })
            })
            .collect()
    }

    fn write_rows<W: Write>(&self, mut writer: TableWriter<W>, rows: Vec<PreparedRow<'_>>) -> EngineResult<ExportSummary> {
        let _entered = self.span.enter();
        if rows.is_empty() {
            info!("nothing to write");
        }

        for row in rows {
            let rendered = row
                .cells
                .iter()
                .map(|cell| match cell {
                    CellSource::Input(value) => Ok((*value).to_string()),
                    CellSource::Output(value) => table::render_cell(*value),
                })
                .collect::<Result<Vec<_>, _>>();
            match rendered {
                Ok(cells) => writer.write_row(&row.label, &cells)?,
                Err(error) => {
                    warn!(entity = %row.label, %error, "encoding error while writing data; row skipped");
                    writer.record_skipped();
                }
            }
        }

        let outcome = writer.finish()?;
        info!(written = outcome.written, skipped = outcome.skipped, "{} entities have been exported", outcome.written);
        Ok(ExportSummary {
            written: outcome.written,
            skipped: outcome.skipped,
        })
    }
}
