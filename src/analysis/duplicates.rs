use super::FindingCode;
use crate::config::DuplicateConfig;
use crate::discovery::SourceFile;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Inclusive range of original (1-indexed) source lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A near-identical region shared by two files
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateBlockFinding {
    pub code: FindingCode,
    pub file_a: PathBuf,
    pub lines_a: LineRange,
    pub file_b: PathBuf,
    pub lines_b: LineRange,
    /// Fraction of equal normalized lines over the block
    pub similarity: f64,
    /// Number of compared normalized lines
    pub size: usize,
}

/// A file reduced to its significant lines, each interned to an id
struct NormalizedFile {
    path: PathBuf,
    line_numbers: Vec<usize>,
    ids: Vec<u32>,
}

/// Finds near-identical code regions across files
pub struct DuplicateBlockDetector {
    min_lines: usize,
    min_similarity: f64,
}

impl DuplicateBlockDetector {
    pub fn new(config: &DuplicateConfig) -> Self {
        Self {
            min_lines: config.min_lines.max(1),
            min_similarity: config.min_similarity.clamp(0.0, 1.0),
        }
    }

    pub fn with_min_lines(mut self, min_lines: usize) -> Self {
        self.min_lines = min_lines.max(1);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity.clamp(0.0, 1.0);
        self
    }

    /// Read and compare source files. Unreadable files are skipped.
    pub fn detect(&self, files: &[SourceFile]) -> Vec<DuplicateBlockFinding> {
        let sources: Vec<(PathBuf, String)> = files
            .par_iter()
            .filter(|f| !f.file_type.is_stub())
            .filter_map(|f| match f.read_contents() {
                Ok(contents) => Some((f.path.clone(), contents)),
                Err(e) => {
                    warn!("Skipping {} for duplicate detection: {}", f.path.display(), e);
                    None
                }
            })
            .collect();
        self.detect_in_sources(&sources)
    }

    pub fn detect_in_sources(&self, sources: &[(PathBuf, String)]) -> Vec<DuplicateBlockFinding> {
        let normalized = normalize_all(sources);

        let pairs: Vec<(usize, usize)> = (0..normalized.len())
            .flat_map(|a| (a + 1..normalized.len()).map(move |b| (a, b)))
            .collect();
        debug!("Comparing {} file pairs", pairs.len());

        let mut findings: Vec<DuplicateBlockFinding> = pairs
            .par_iter()
            .flat_map_iter(|&(a, b)| self.compare(&normalized[a], &normalized[b]))
            .collect();

        findings.sort_by(|x, y| {
            x.file_a
                .cmp(&y.file_a)
                .then(x.lines_a.start.cmp(&y.lines_a.start))
                .then(x.file_b.cmp(&y.file_b))
                .then(x.lines_b.start.cmp(&y.lines_b.start))
        });

        info!("Found {} duplicate blocks", findings.len());
        findings
    }

    /// Matches a window must reach
    fn required_matches(&self) -> usize {
        let required = (self.min_similarity * self.min_lines as f64 - 1e-9).ceil() as usize;
        required.clamp(1, self.min_lines)
    }

    fn compare(&self, a: &NormalizedFile, b: &NormalizedFile) -> Vec<DuplicateBlockFinding> {
        let n = self.min_lines;
        if a.ids.len() < n || b.ids.len() < n {
            return Vec::new();
        }

        let required = self.required_matches();
        let in_b: HashSet<u32> = b.ids.iter().copied().collect();
        let shared = a.ids.iter().filter(|id| in_b.contains(id)).count();
        if shared < required {
            return Vec::new();
        }

        // Candidate windows grouped by diagonal (j - i)
        let budget = n - required;
        let mut diagonals: HashMap<isize, Vec<usize>> = HashMap::new();
        for i in 0..=a.ids.len() - n {
            for j in 0..=b.ids.len() - n {
                let mut mismatches = 0;
                for k in 0..n {
                    if a.ids[i + k] != b.ids[j + k] {
                        mismatches += 1;
                        if mismatches > budget {
                            break;
                        }
                    }
                }
                if mismatches <= budget {
                    diagonals
                        .entry(j as isize - i as isize)
                        .or_default()
                        .push(i);
                }
            }
        }

        let mut spans: Vec<(usize, usize, usize)> = Vec::new();
        for (diagonal, mut starts) in diagonals {
            starts.sort_unstable();
            let mut run_start = starts[0];
            let mut run_end = starts[0] + n - 1;
            for &start in &starts[1..] {
                if start <= run_end + 1 {
                    run_end = run_end.max(start + n - 1);
                } else {
                    spans.push((run_start, run_end, (run_start as isize + diagonal) as usize));
                    run_start = start;
                    run_end = start + n - 1;
                }
            }
            spans.push((run_start, run_end, (run_start as isize + diagonal) as usize));
        }

        let mut findings: Vec<(usize, usize, usize, usize, f64)> = Vec::new();
        for (a_start, a_end, b_start) in spans {
            let matches: Vec<bool> = (0..=a_end - a_start)
                .map(|k| a.ids[a_start + k] == b.ids[b_start + k])
                .collect();
            let mut parts = Vec::new();
            self.split_span(&matches, 0, &mut parts);
            findings.extend(parts.into_iter().map(|(start, end, similarity)| {
                (a_start + start, a_start + end, b_start + start, b_start + end, similarity)
            }));
        }

        // Drop findings contained in a larger one
        findings.sort_by(|x, y| (y.1 - y.0).cmp(&(x.1 - x.0)).then(x.0.cmp(&y.0)));
        let mut kept: Vec<(usize, usize, usize, usize, f64)> = Vec::new();
        for f in findings {
            let contained = kept
                .iter()
                .any(|k| k.0 <= f.0 && f.1 <= k.1 && k.2 <= f.2 && f.3 <= k.3);
            if !contained {
                kept.push(f);
            }
        }

        kept.into_iter()
            .map(|(a_start, a_end, b_start, b_end, similarity)| DuplicateBlockFinding {
                code: FindingCode::DuplicateBlock,
                file_a: a.path.clone(),
                lines_a: LineRange {
                    start: a.line_numbers[a_start],
                    end: a.line_numbers[a_end],
                },
                file_b: b.path.clone(),
                lines_b: LineRange {
                    start: b.line_numbers[b_start],
                    end: b.line_numbers[b_end],
                },
                similarity,
                size: a_end - a_start + 1,
            })
            .collect()
    }

    /// Longest sub-spans of a merged diagonal run that still meet both thresholds.
    /// A run always contains at least one of the windows it was merged from.
    fn split_span(&self, matches: &[bool], offset: usize, out: &mut Vec<(usize, usize, f64)>) {
        let n = self.min_lines;
        if matches.len() < n {
            return;
        }

        let mut prefix = vec![0usize; matches.len() + 1];
        for (k, &m) in matches.iter().enumerate() {
            prefix[k + 1] = prefix[k] + usize::from(m);
        }

        let mut best: Option<(usize, usize, f64)> = None;
        for start in 0..=matches.len() - n {
            for end in (start + n - 1..matches.len()).rev() {
                let len = end - start + 1;
                if best.map_or(false, |(s, e, _)| len <= e - s + 1) {
                    break;
                }
                let similarity = (prefix[end + 1] - prefix[start]) as f64 / len as f64;
                if similarity + 1e-9 >= self.min_similarity {
                    best = Some((start, end, similarity));
                    break;
                }
            }
        }

        let Some((start, end, similarity)) = best else {
            return;
        };
        self.split_span(&matches[..start], offset, out);
        out.push((offset + start, offset + end, similarity));
        self.split_span(&matches[end + 1..], offset + end + 1, out);
    }
}

/// Strip whitespace, drop blank and comment-only lines, intern the rest
fn normalize_all(sources: &[(PathBuf, String)]) -> Vec<NormalizedFile> {
    let mut interner: HashMap<&str, u32> = HashMap::new();
    let mut files = Vec::with_capacity(sources.len());

    for (path, contents) in sources {
        let mut line_numbers = Vec::new();
        let mut ids = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let next = interner.len() as u32;
            let id = *interner.entry(trimmed).or_insert(next);
            line_numbers.push(idx + 1);
            ids.push(id);
        }
        files.push(NormalizedFile {
            path: path.clone(),
            line_numbers,
            ids,
        });
    }

    files
}
