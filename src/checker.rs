//! Whole-archive validation and summaries.
//!
//! These are the consumer-facing entry points: they take a path or a parsed
//! archive, run a parse-only check or a full joined pass, and report with
//! `anyhow` context naming the file that failed.

use crate::config::PassConfig;
use crate::descriptor::{ArchiveDescriptor, SourceDescriptor, read_archive};
use crate::io::{CountRows, RecordSource};
use crate::join::{CancelToken, Pass, PassStats};
use crate::record::{FieldValue, Record};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Row count of one source after a parse-only read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCheck {
    pub label: String,
    pub row_type: Option<String>,
    pub rows: u64,
}

/// Most sample values kept per term.
pub const SAMPLE_LIMIT: usize = 20;

/// Distinct values remembered per term; counting stops beyond this.
pub const DISTINCT_LIMIT: usize = 100_000;

/// What a pass saw for one term of one source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Records with a non-empty value.
    pub populated: u64,
    pub empty: u64,
    /// Distinct non-empty values. A lower bound once `distinct_capped` is set.
    pub distinct: u64,
    pub distinct_capped: bool,
    /// Every non-empty value parsed as an integer.
    pub integers: bool,
    /// The first distinct values seen, at most [`SAMPLE_LIMIT`].
    pub samples: Vec<String>,
}

impl FieldStats {
    /// Non-empty everywhere with no repeated value.
    #[must_use]
    pub fn possible_key(&self) -> bool {
        self.populated > 0
            && self.empty == 0
            && !self.distinct_capped
            && self.distinct == self.populated
    }
}

/// Per-extension figures from a joined pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSummary {
    pub row_type: Option<String>,
    pub location: Option<String>,
    /// Records the join consumed from this extension.
    pub rows: u64,
    pub matches: u64,
    pub orphans: u64,
    /// Statistics over the matched records, per term.
    pub fields: BTreeMap<String, FieldStats>,
}

/// What a full pass over an archive saw.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub core_row_type: Option<String>,
    pub core_location: Option<String>,
    pub core_rows: u64,
    pub fields: BTreeMap<String, FieldStats>,
    pub extensions: Vec<ExtensionSummary>,
}

impl ArchiveSummary {
    /// # Errors
    /// Only if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize archive summary")
    }
}

/// Running statistics for one term.
#[derive(Default)]
struct FieldTally {
    stats: FieldStats,
    seen: HashSet<String>,
    non_integer: bool,
}

impl FieldTally {
    fn observe(&mut self, value: FieldValue<'_>) {
        let text = match value.as_str() {
            Some(text) if value.is_populated() => text,
            _ => {
                self.stats.empty += 1;
                return;
            }
        };
        self.stats.populated += 1;
        if text.trim().parse::<i64>().is_err() {
            self.non_integer = true;
        }
        if self.seen.contains(text) {
            return;
        }
        if self.seen.len() >= DISTINCT_LIMIT {
            self.stats.distinct_capped = true;
            return;
        }
        self.seen.insert(text.to_string());
        self.stats.distinct += 1;
        if self.stats.samples.len() < SAMPLE_LIMIT {
            self.stats.samples.push(text.to_string());
        }
    }

    fn finish(self) -> FieldStats {
        FieldStats {
            integers: self.stats.populated > 0 && !self.non_integer,
            ..self.stats
        }
    }
}

type Tallies = BTreeMap<String, FieldTally>;

fn tallies_for(source: &SourceDescriptor) -> Tallies {
    source
        .fields()
        .iter()
        .filter_map(|f| f.term())
        .map(|t| (t.to_string(), FieldTally::default()))
        .collect()
}

fn observe_record(tallies: &mut Tallies, record: &Record) {
    for (term, value) in record.iter() {
        if let Some(tally) = tallies.get_mut(term) {
            tally.observe(value);
        }
    }
}

fn finish_tallies(tallies: Tallies) -> BTreeMap<String, FieldStats> {
    tallies.into_iter().map(|(t, tally)| (t, tally.finish())).collect()
}

/// Locate, parse and structurally check the archive at `path` (its directory or
/// its metadata file).
///
/// # Errors
/// Any descriptor or structural error, with the path as context.
pub fn open_archive(path: impl AsRef<Path>) -> Result<ArchiveDescriptor> {
    let path = path.as_ref();
    let archive = read_archive(path).with_context(|| format!("read archive {}", path.display()))?;
    archive
        .check()
        .with_context(|| format!("check archive {}", path.display()))?;
    Ok(archive)
}

/// Read every line of every source without sorting or joining.
///
/// # Errors
/// The first source that cannot be opened or contains a malformed line.
pub fn check_sources(archive: &ArchiveDescriptor) -> Result<Vec<SourceCheck>> {
    let core = archive.core()?;
    std::iter::once(core)
        .chain(archive.extensions())
        .map(|source| {
            let path = archive.resolve(source)?;
            let records = RecordSource::open(Arc::clone(source), &path, false, CancelToken::new())
                .with_context(|| format!("open {}", path.display()))?;
            let mut sink = CountRows::default();
            records
                .drain(&mut sink)
                .with_context(|| format!("check {}", source.label()))?;
            info!(source = %source.label(), rows = sink.rows(), "source checked");
            Ok(SourceCheck {
                label: source.label(),
                row_type: source.row_type().map(str::to_string),
                rows: sink.rows(),
            })
        })
        .collect()
}

/// [`open_archive`] followed by [`check_sources`].
///
/// # Errors
/// See both.
pub fn check_archive(path: impl AsRef<Path>) -> Result<Vec<SourceCheck>> {
    let archive = open_archive(path)?;
    check_sources(&archive)
}

/// Run one full joined pass and gather per-term statistics for the core and,
/// over matched records, for every extension.
///
/// # Errors
/// Whatever the pass reports, with context.
pub fn summarize(
    archive: &ArchiveDescriptor,
    include_defaults: bool,
    config: PassConfig,
) -> Result<ArchiveSummary> {
    let core = archive.core()?;
    let mut core_tallies = tallies_for(core);
    let mut ext_tallies: Vec<Tallies> =
        archive.extensions().iter().map(|e| tallies_for(e)).collect();
    let mut core_rows = 0;

    let mut pass = Pass::open(archive, include_defaults, config).context("open pass")?;
    while pass.has_next() {
        let set = pass.next_record_set().context("read record set")?;
        core_rows += 1;
        observe_record(&mut core_tallies, set.core());
        for (position, record) in set.extensions() {
            if let Some(tallies) = ext_tallies.get_mut(position) {
                observe_record(tallies, record);
            }
        }
    }
    pass.close();

    let PassStats {
        rows,
        matches,
        orphans,
    } = pass.stats();
    let extensions = archive
        .extensions()
        .iter()
        .zip(ext_tallies)
        .enumerate()
        .map(|(i, (ext, tallies))| ExtensionSummary {
            row_type: ext.row_type().map(str::to_string),
            location: ext.primary_location().map(str::to_string),
            rows: rows.get(i + 1).copied().unwrap_or(0),
            matches: matches.get(i).copied().unwrap_or(0),
            orphans: orphans.get(i).copied().unwrap_or(0),
            fields: finish_tallies(tallies),
        })
        .collect();
    info!(core_rows, extensions = archive.extensions().len(), "archive summarized");

    Ok(ArchiveSummary {
        core_row_type: core.row_type().map(str::to_string),
        core_location: core.primary_location().map(str::to_string),
        core_rows,
        fields: finish_tallies(core_tallies),
        extensions,
    })
}

/// Write `Statistics-<file>` and `Mapping-<file>` into `out_dir` for the core
/// and every extension, named after each source's data file.
///
/// The statistics file has one row per term with its counts and samples. The
/// mapping file lists every term against itself with its default, ready to be
/// edited into a renaming.
///
/// # Errors
/// If `out_dir` cannot be created or a file cannot be written.
pub fn write_statistics(
    archive: &ArchiveDescriptor,
    summary: &ArchiveSummary,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;

    let core = archive.core()?;
    let sources = std::iter::once((core, &summary.fields)).chain(
        archive
            .extensions()
            .iter()
            .zip(&summary.extensions)
            .map(|(source, ext)| (source, &ext.fields)),
    );
    let mut written = Vec::new();
    for (source, fields) in sources {
        let name = data_file_name(source);
        let stats_path = out_dir.join(format!("Statistics-{name}"));
        write_field_stats(source, fields, &stats_path)
            .with_context(|| format!("write {}", stats_path.display()))?;
        let mapping_path = out_dir.join(format!("Mapping-{name}"));
        write_mapping(source, &mapping_path)
            .with_context(|| format!("write {}", mapping_path.display()))?;
        written.push(stats_path);
        written.push(mapping_path);
    }
    info!(files = written.len(), dir = %out_dir.display(), "statistics written");
    Ok(written)
}

fn data_file_name(source: &SourceDescriptor) -> String {
    source
        .primary_location()
        .and_then(|l| Path::new(l).file_name())
        .map_or_else(
            || format!("{}.csv", source.role()),
            |n| n.to_string_lossy().into_owned(),
        )
}

/// Terms in field order, each once.
fn ordered_terms(source: &SourceDescriptor) -> Vec<&str> {
    let mut seen = HashSet::new();
    source
        .fields()
        .iter()
        .filter_map(|f| f.term())
        .filter(|t| seen.insert(*t))
        .collect()
}

fn write_field_stats(
    source: &SourceDescriptor,
    fields: &BTreeMap<String, FieldStats>,
    path: &Path,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "term",
        "populated",
        "empty",
        "distinct",
        "possible_key",
        "integers",
        "samples",
    ])?;
    for term in ordered_terms(source) {
        let Some(stats) = fields.get(term) else {
            continue;
        };
        let distinct = if stats.distinct_capped {
            format!("{}+", stats.distinct)
        } else {
            stats.distinct.to_string()
        };
        wtr.write_record([
            term.to_string(),
            stats.populated.to_string(),
            stats.empty.to_string(),
            distinct,
            stats.possible_key().to_string(),
            stats.integers.to_string(),
            stats.samples.join(" | "),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_mapping(source: &SourceDescriptor, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["OldField", "NewField", "Shown", "Default"])?;
    for term in ordered_terms(source) {
        let default = source.field(term).and_then(|f| f.default_value()).unwrap_or("");
        wtr.write_record([term, term, "true", default])?;
    }
    wtr.flush()?;
    Ok(())
}
