use std::collections::HashSet;

use log::{debug, trace};
use tracing::{Level, event, info_span};

use super::context::LoadContext;
use super::reader::RowReader;
use crate::core::Result;
use crate::result::{LoadResult, ResultValue};
use crate::row::RowSource;
use crate::session::{ProcessingOptions, Session};

/// Drives a [`RowReader`] over a row source within one result-set scope.
/// Loading collections are published by [`ResultSetProcessor::finish`];
/// an error or an early drop abandons them.
pub struct ResultSetProcessor<'a> {
    reader: &'a mut RowReader,
    source: &'a mut dyn RowSource,
    session: &'a mut Session,
    load_context: LoadContext,
    options: ProcessingOptions,
    rows_read: usize,
    finished: bool,
}

impl<'a> ResultSetProcessor<'a> {
    pub fn new(
        reader: &'a mut RowReader,
        source: &'a mut dyn RowSource,
        session: &'a mut Session,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            reader,
            source,
            session,
            load_context: LoadContext::new(),
            options,
            rows_read: 0,
            finished: false,
        }
    }

    /// Result of the next row, or `None` once the source is exhausted.
    pub fn next_row(&mut self) -> Result<Option<ResultValue>> {
        if self.finished {
            return Ok(None);
        }
        match self.read_next() {
            Ok(row) => Ok(row),
            Err(err) => {
                debug!("Aborting result set after {} rows: {}", self.rows_read, err);
                self.finished = true;
                self.load_context.discard();
                Err(err)
            }
        }
    }

    fn read_next(&mut self) -> Result<Option<ResultValue>> {
        if !self.source.advance()? {
            return Ok(None);
        }
        let value = self
            .reader
            .read_row(&*self.source, &mut *self.session, &mut self.load_context, &self.options)?;
        self.rows_read += 1;
        trace!("Read row {}", self.rows_read);
        Ok(Some(value))
    }

    /// Commits every collection still loading. Returns how many were
    /// committed.
    pub fn finish(&mut self) -> Result<usize> {
        if self.finished {
            return Ok(0);
        }
        self.finished = true;
        self.load_context.finish_up(&mut *self.session)
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn session(&self) -> &Session {
        &*self.session
    }

    pub fn load_context(&self) -> &LoadContext {
        &self.load_context
    }
}

impl Drop for ResultSetProcessor<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Result set dropped after {} rows without finishing", self.rows_read);
            self.load_context.discard();
        }
    }
}

/// Reads a whole row source into a list of row results.
#[derive(Debug, Default)]
pub struct ListResultsConsumer;

impl ListResultsConsumer {
    pub fn consume(
        reader: &mut RowReader,
        source: &mut dyn RowSource,
        session: &mut Session,
        options: &ProcessingOptions,
    ) -> Result<LoadResult> {
        let span = info_span!(
            "load.results",
            session = %session.id(),
            results = reader.aliases().len()
        );
        let _enter = span.enter();

        let aliases = reader.aliases().to_vec();
        let unique = options.unique_results;
        let mut processor = ResultSetProcessor::new(reader, source, session, options.clone());
        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        while let Some(row) = processor.next_row()? {
            if unique {
                if let Some(entity) = row.as_entity() {
                    if !seen.insert(entity.addr()) {
                        continue;
                    }
                }
            }
            rows.push(row);
        }
        let committed = processor.finish()?;
        event!(
            Level::DEBUG,
            rows = processor.rows_read(),
            results = rows.len(),
            collections = committed,
            "results consumed"
        );
        Ok(LoadResult::new(aliases, rows))
    }
}
