//! Line-level streaming primitives shared by the sampler, splitter and converter.
//!
//! Input is read as raw bytes so the splitter can copy lines verbatim; fields are decoded
//! as UTF-8 (lossily) only when a record is actually parsed.

use anyhow::Result;
use std::borrow::Cow;
use std::io::{self, BufRead, Read};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Drop a trailing `\n` or `\r\n`.
#[inline]
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// True for lines that carry no record (empty after trimming the line ending).
#[inline]
pub fn is_blank(line: &[u8]) -> bool {
    trim_line_ending(line).is_empty()
}

/// Decode a raw line (line ending removed). Invalid UTF-8 is replaced, never rejected.
#[inline]
pub fn decode_line(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(trim_line_ending(line))
}

/// Split a decoded line on a literal separator. No quoting or escaping is honoured.
#[inline]
pub fn split_fields<'a>(line: &'a str, separator: &'a str) -> std::str::Split<'a, &'a str> {
    line.split(separator)
}

/// Parse the header line into column names.
pub fn parse_header(line: &[u8], separator: &str) -> Vec<String> {
    let decoded = decode_line(line);
    split_fields(&decoded, separator).map(str::to_string).collect()
}

/// Call `on_line` for every line of `reader`, line ending included.
/// Returns the number of lines visited. Stops early when `on_line` returns `Ok(false)`.
pub fn for_each_raw_line<R: BufRead>(
    reader: &mut R,
    mut on_line: impl FnMut(&[u8]) -> Result<bool>,
) -> Result<u64> {
    let mut buf = Vec::with_capacity(16 * 1024);
    let mut seen = 0u64;
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        seen += 1;
        if !on_line(&buf)? {
            break;
        }
    }
    Ok(seen)
}

/// A `Read` wrapper that counts bytes read, for byte-based progress.
pub struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicU64>) {
        let counter = Arc::new(AtomicU64::new(0));
        (Self { inner, counter: counter.clone() }, counter)
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Returns the bytes read since the previous call and remembers the new position.
#[inline]
pub fn take_progress(counter: &AtomicU64, last: &mut u64) -> u64 {
    let cur = counter.load(Ordering::Relaxed);
    let delta = cur.saturating_sub(*last);
    *last = cur;
    delta
}
