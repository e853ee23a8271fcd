use crate::assemble::{AssembleError, ChunkInfo, Generator, OutputContext};
use crate::cache::PageRecord;
use std::path::PathBuf;

/// Parses a human size string like "10MB", "500KB", or "2048" into bytes
pub fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim().to_uppercase();
    if s.is_empty() {
        return Err("empty size".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size number in '{}'", input))?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        "TB" | "T" => 1024u64.pow(4),
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    Ok((value * multiplier as f64) as u64)
}

/// Estimated output bytes for one record in a given format
///
/// Cheap pre-generation measurement: the longer of the record's HTML and
/// plain text, plus metadata, times the format overhead multiplier. Stored
/// image bodies add a flat estimate each.
pub fn estimate_record_size(record: &PageRecord, overhead: f64) -> u64 {
    let base = record.content.len().max(record.text_content.len())
        + record.metadata.description.len()
        + record.metadata.author.len()
        + record.metadata.keywords.iter().map(String::len).sum::<usize>();

    let mut estimate = (base as f64 * overhead) as u64;

    let stored_images = record.images.iter().filter(|i| i.local_path.is_some()).count();
    estimate += stored_images as u64 * 50 * 1024;

    estimate
}

/// Splits a record sequence into consecutive chunks
pub trait Partitioner {
    fn partition<'a>(&self, records: &'a [PageRecord]) -> Vec<&'a [PageRecord]>;
}

/// Greedy size-bounded partitioning
///
/// Consecutive records accumulate until the next one would overflow the
/// budget. A single record whose estimate alone exceeds the budget becomes
/// its own chunk.
pub struct SizePartitioner {
    pub max_bytes: u64,
    pub overhead: f64,
}

impl Partitioner for SizePartitioner {
    fn partition<'a>(&self, records: &'a [PageRecord]) -> Vec<&'a [PageRecord]> {
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut current_size = 0u64;

        for (i, record) in records.iter().enumerate() {
            let size = estimate_record_size(record, self.overhead);
            if i > start && current_size + size > self.max_bytes {
                chunks.push(&records[start..i]);
                start = i;
                current_size = 0;
            }
            current_size += size;
        }

        if start < records.len() {
            chunks.push(&records[start..]);
        }

        chunks
    }
}

/// Fixed-count partitioning
pub struct PagePartitioner {
    pub pages_per_chunk: usize,
}

impl Partitioner for PagePartitioner {
    fn partition<'a>(&self, records: &'a [PageRecord]) -> Vec<&'a [PageRecord]> {
        if self.pages_per_chunk == 0 {
            return vec![records];
        }
        records.chunks(self.pages_per_chunk).collect()
    }
}

/// `<prefix>_chunk_NNN_of_MMM.<ext>`
pub fn chunk_filename(prefix: &str, number: usize, total: usize, extension: &str) -> String {
    format!(
        "{}_chunk_{:03}_of_{:03}.{}",
        prefix, number, total, extension
    )
}

/// `<prefix>_INDEX.<ext>`
pub fn index_filename(prefix: &str, extension: &str) -> String {
    format!("{}_INDEX.{}", prefix, extension)
}

/// Drives a generator through a partitioner
///
/// One chunk degenerates to a plain whole-artifact generation. Otherwise
/// every chunk is written under the prefix, plus an index file listing them
/// all; the index path comes first in the returned list.
pub fn generate_chunked(
    generator: &dyn Generator,
    partitioner: &dyn Partitioner,
    records: &[PageRecord],
    ctx: &OutputContext,
    prefix: &str,
) -> Result<Vec<PathBuf>, AssembleError> {
    if records.is_empty() {
        return Err(AssembleError::NoRecords);
    }

    let chunks = partitioner.partition(records);
    debug_assert_eq!(
        chunks.iter().map(|c| c.len()).sum::<usize>(),
        records.len(),
        "partition must cover every record exactly once"
    );

    if chunks.len() <= 1 {
        tracing::info!("Records fit in a single chunk; writing one artifact");
        return generator.generate(records, ctx);
    }

    std::fs::create_dir_all(ctx.output_dir)?;

    let total = chunks.len();
    let extension = generator.extension();
    let mut written = Vec::new();
    let mut index_entries = Vec::new();
    let mut page_offset = 1;

    for (i, chunk) in chunks.iter().enumerate() {
        let name = chunk_filename(prefix, i + 1, total, extension);
        let path = ctx.output_dir.join(&name);
        generator.generate_chunk(
            chunk,
            ctx,
            &path,
            ChunkInfo {
                number: i + 1,
                total,
                page_offset,
            },
        )?;
        tracing::info!("Wrote chunk {}/{}: {}", i + 1, total, path.display());
        index_entries.push((name, chunk.len()));
        written.push(path);
        page_offset += chunk.len();
    }

    let index_path = ctx.output_dir.join(index_filename(prefix, extension));
    generator.generate_index(&index_entries, ctx, &index_path)?;
    written.insert(0, index_path);

    Ok(written)
}
