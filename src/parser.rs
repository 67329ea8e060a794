use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use serde::Deserialize;

use crate::error::{PrepError, PrepResult};
use crate::types::{AnnotationRecord, SignDescriptor, Visibility, MISC_TAG, OTHER_SENTINEL};

/// Options steering descriptor filtering during the parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Only keep signs tagged as visible, excluding blurred or occluded ones.
    pub visible_only: bool,
}

/// Parse one annotation line of the form
/// `image_name:tag,x_max,y_max,x_min,y_min,...,category,name;...;`.
///
/// Sentinel descriptors (MISC_SIGNS tag or OTHER name) are dropped from the
/// result but still decide whether the image counts as labeled at all: a
/// line carrying nothing but sentinels lands in the same bucket as an empty
/// annotation.
pub fn parse_line(line: &str, line_no: usize, opts: ParseOptions) -> PrepResult<AnnotationRecord> {
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() < 2 {
        return Err(PrepError::parse(line_no, "expected `image_name:annotations`"));
    }
    let image_name = fields[0].trim().to_string();
    let annotation = fields[1];

    let mut signs = Vec::new();
    let mut has_labeled_sign = false;

    if !annotation.is_empty() {
        for chunk in annotation.split(';') {
            // a trailing `;` terminates the descriptor list
            if chunk.is_empty() {
                break;
            }
            let parts: Vec<&str> = chunk.trim().split(',').map(str::trim).collect();
            let first = parts[0];
            let last = *parts.last().unwrap_or(&"");
            if first == MISC_TAG || last == OTHER_SENTINEL {
                continue;
            }
            has_labeled_sign = true;

            if parts.len() < 7 {
                return Err(PrepError::parse(
                    line_no,
                    format!("descriptor `{}` has too few fields", chunk.trim()),
                ));
            }
            let mut raw_coords = [0f32; 4];
            for (slot, value) in raw_coords.iter_mut().zip(&parts[1..5]) {
                *slot = value.parse::<f32>().map_err(|_| {
                    PrepError::parse(line_no, format!("non-numeric coordinate `{}`", value))
                })?;
            }

            let visibility = Visibility::parse(first);
            if opts.visible_only && !visibility.is_visible() {
                continue;
            }
            signs.push(SignDescriptor {
                visibility,
                raw_coords,
                category: parts[parts.len() - 2].to_string(),
                name: last.to_string(),
            });
        }
    }

    Ok(AnnotationRecord {
        image_name,
        signs,
        has_labeled_sign,
    })
}

/// Streaming reader over an annotation corpus, one record per line in file
/// order. Re-opening the same file yields the same sequence.
pub struct CorpusReader {
    lines: Lines<BufReader<File>>,
    opts: ParseOptions,
    line_no: usize,
}

impl CorpusReader {
    pub fn open(path: &Path, opts: ParseOptions) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            opts,
            line_no: 0,
        })
    }
}

impl Iterator for CorpusReader {
    type Item = PrepResult<AnnotationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        self.line_no += 1;
        Some(parse_line(&line, self.line_no, self.opts))
    }
}

// Most common first, ties broken by name so the ordering is reproducible.
fn sorted_freqs(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut freqs: Vec<(String, usize)> = counts.into_iter().collect();
    freqs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    freqs
}

/// Count how often each sign name occurs across a set of records.
pub fn sign_frequencies<'a, I>(records: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a AnnotationRecord>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        for sign in &record.signs {
            *counts.entry(sign.name.clone()).or_default() += 1;
        }
    }
    sorted_freqs(counts)
}

/// Scan a corpus file for sign frequencies, skipping malformed lines.
/// Records are consumed as they stream by; nothing is retained.
pub fn scan_frequencies(path: &Path, opts: ParseOptions) -> PrepResult<Vec<(String, usize)>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for parsed in CorpusReader::open(path, opts)? {
        match parsed {
            Ok(record) => {
                for sign in record.signs {
                    *counts.entry(sign.name).or_default() += 1;
                }
            }
            Err(e) => log::warn!("frequency scan: {}", e),
        }
    }
    Ok(sorted_freqs(counts))
}

/// Injected sign-frequency mapping, `{"SIGN_NAME": count, ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct FrequencyTable(pub HashMap<String, usize>);

/// Load an externally supplied frequency table, returned in the same
/// most-common-first order as `sign_frequencies`.
pub fn load_frequency_table(path: &Path) -> PrepResult<Vec<(String, usize)>> {
    let file = File::open(path)?;
    let table: FrequencyTable = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PrepError::parse(0, format!("frequency table {}: {}", path.display(), e)))?;
    Ok(sorted_freqs(table.0))
}
