use super::SymbolIndex;
use crate::discovery::SourceFile;
use crate::parser::{ParseFailure, Parser as SourceParser, PythonParser};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sequential builder for the symbol index
pub struct IndexBuilder {
    index: SymbolIndex,

    parser: PythonParser,

    root: PathBuf,
}

impl IndexBuilder {
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            index: SymbolIndex::new(),
            parser: PythonParser::new().into_diagnostic()?,
            root: root.to_path_buf(),
        })
    }

    /// Process a source file. Parse failures are recorded, never returned.
    pub fn process_file(&mut self, file: &SourceFile) {
        debug!("Parsing Python file: {}", file.path.display());

        let contents = match file.read_contents() {
            Ok(contents) => contents,
            Err(source) => {
                self.index.record_failure(ParseFailure::Io {
                    path: file.path.clone(),
                    source,
                });
                return;
            }
        };

        let module = file.module_path(&self.root);
        match self.parser.parse(&file.path, &module, &contents) {
            Ok(parsed) => self.index.absorb(parsed, file.file_type.is_stub()),
            Err(failure) => self.index.record_failure(failure),
        }
    }

    /// Process every file, optionally drawing a progress bar
    pub fn process_files(&mut self, files: &[SourceFile], progress: bool) {
        let pb = if progress {
            let pb = ProgressBar::new(files.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        for file in files {
            self.process_file(file);
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    /// Build the final index, resolving all call-sites
    pub fn build(mut self) -> SymbolIndex {
        self.index.resolve();
        self.index
    }
}
