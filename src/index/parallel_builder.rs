// Parallel index builder using rayon

use super::SymbolIndex;
use crate::discovery::SourceFile;
use crate::parser::{ParseFailure, ParseResult, Parser as SourceParser, PythonParser};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// Parallel index builder for faster processing
pub struct ParallelIndexBuilder {
    root: PathBuf,
}

impl ParallelIndexBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Build the index from source files using parallel processing
    pub fn build_from_files(&self, files: &[SourceFile]) -> SymbolIndex {
        info!("Parsing {} files in parallel...", files.len());

        // One tree-sitter parser per worker
        let results: Vec<(Result<ParseResult, ParseFailure>, bool)> = files
            .par_iter()
            .map_init(PythonParser::new, |parser, file| {
                let result = match parser {
                    Ok(parser) => self.parse_file(parser, file),
                    Err(e) => Err(ParseFailure::Language(e.to_string())),
                };
                (result, file.file_type.is_stub())
            })
            .collect();

        // Single aggregation point
        let mut index = SymbolIndex::new();
        for (result, is_stub) in results {
            match result {
                Ok(parsed) => index.absorb(parsed, is_stub),
                Err(failure) => index.record_failure(failure),
            }
        }

        info!("Resolving call-sites...");
        index.resolve();
        index
    }

    fn parse_file(
        &self,
        parser: &mut PythonParser,
        file: &SourceFile,
    ) -> Result<ParseResult, ParseFailure> {
        let contents = file.read_contents().map_err(|source| ParseFailure::Io {
            path: file.path.clone(),
            source,
        })?;
        let module = file.module_path(&self.root);
        parser.parse(&file.path, &module, &contents)
    }
}
