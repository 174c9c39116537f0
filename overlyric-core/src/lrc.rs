//! Timed-lyric (LRC) parsing and line lookup.

use crate::playback::SongIdentity;

/// Parsed lyric text: metadata tags plus the ordered timed lines.
///
/// A timeline is immutable once built; a new song or new lyric text produces a
/// new timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricTimeline {
    pub metadata: LyricMetadata,
    pub lines: Vec<LyricLine>,
}

/// LRC metadata from ID tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
}

impl LyricMetadata {
    /// True when the `[ti:]` or `[ar:]` tag names a different song than
    /// `identity`. Missing tags or identity fields never contradict.
    #[must_use]
    pub fn contradicts(&self, identity: &SongIdentity) -> bool {
        fn differs(tag: Option<&str>, field: &str) -> bool {
            match tag.map(str::trim) {
                Some(tag) if !tag.is_empty() && !field.trim().is_empty() => {
                    !tag.eq_ignore_ascii_case(field.trim())
                }
                _ => false,
            }
        }

        differs(self.title.as_deref(), identity.title())
            || differs(self.artist.as_deref(), identity.artist())
    }
}

/// A single line of lyrics with its start offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub time_ms: u64,
    pub text: String,
}

impl LyricTimeline {
    /// Parse LRC text.
    ///
    /// Lines that do not start with a `[mm:ss.ff]` tag are skipped, as are tagged
    /// lines with blank content. A line may carry several leading tags; each one
    /// yields its own entry. Entries are sorted by time, and a run of entries
    /// sharing one timestamp is folded into `first(second)(third)...`, which is how
    /// sources ship a line together with its translation.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut metadata = LyricMetadata::default();
        let mut lines = Vec::new();

        for line in input.trim_start_matches('\u{feff}').lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((tag, value)) = parse_id_tag(line) {
                match tag.to_lowercase().as_str() {
                    "ti" => metadata.title = Some(value),
                    "ar" => metadata.artist = Some(value),
                    "al" => metadata.album = Some(value),
                    "by" | "au" => metadata.author = Some(value),
                    _ => {} // Ignore unknown tags
                }
                continue;
            }

            if let Some(parsed_lines) = parse_lyric_line(line) {
                lines.extend(parsed_lines);
            }
        }

        // Stable sort keeps the original line first within a timestamp
        lines.sort_by_key(|l| l.time_ms);

        Self {
            metadata,
            lines: merge_same_timestamp(lines),
        }
    }

    /// Index of the line active at `position_ms`: the last line whose start is at
    /// or before the position. `None` before the first line or when empty.
    #[must_use]
    pub fn resolve(&self, position_ms: u64) -> Option<usize> {
        self.lines
            .partition_point(|line| line.time_ms <= position_ms)
            .checked_sub(1)
    }

    /// The line active at `position_ms`.
    #[must_use]
    pub fn current_line(&self, position_ms: u64) -> Option<&LyricLine> {
        self.resolve(position_ms).map(|i| &self.lines[i])
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Parse an ID tag like [ti:Title] or [ar:Artist]
fn parse_id_tag(line: &str) -> Option<(String, String)> {
    if !line.starts_with('[') {
        return None;
    }

    let end = line.find(']')?;
    let content = &line[1..end];
    let (tag, value) = content.split_once(':')?;

    // A numeric tag is a timestamp, not an ID tag
    if tag.is_empty() || tag.chars().any(|c| !c.is_ascii_alphabetic()) {
        return None;
    }

    Some((tag.to_string(), value.trim().to_string()))
}

/// Parse a lyric line like [00:12.34]Hello world or [00:12.34][00:15.67]Same lyrics
fn parse_lyric_line(line: &str) -> Option<Vec<LyricLine>> {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while let Some(rest) = remaining.strip_prefix('[') {
        let Some(end) = rest.find(']') else {
            break;
        };
        let Some(time_ms) = parse_timestamp(&rest[..end]) else {
            break;
        };
        timestamps.push(time_ms);
        remaining = &rest[end + 1..];
    }

    if timestamps.is_empty() {
        return None;
    }

    let text = remaining.trim();
    if text.is_empty() {
        return None;
    }

    Some(
        timestamps
            .into_iter()
            .map(|time_ms| LyricLine {
                time_ms,
                text: text.to_string(),
            })
            .collect(),
    )
}

/// Parse a timestamp like "01:05.30" into milliseconds.
///
/// The fraction is exactly two digits of hundredths of a second.
fn parse_timestamp(s: &str) -> Option<u64> {
    let (minutes, rest) = s.split_once(':')?;
    let (seconds, hundredths) = rest.split_once('.')?;

    if !is_digits(minutes) || !is_digits(seconds) || hundredths.len() != 2 || !is_digits(hundredths)
    {
        return None;
    }

    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    let hundredths: u64 = hundredths.parse().ok()?;

    minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(hundredths * 10)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Fold each run of equal timestamps into one line.
fn merge_same_timestamp(lines: Vec<LyricLine>) -> Vec<LyricLine> {
    let mut merged: Vec<LyricLine> = Vec::with_capacity(lines.len());

    for line in lines {
        match merged.last_mut() {
            Some(last) if last.time_ms == line.time_ms => {
                last.text.push('(');
                last.text.push_str(&line.text);
                last.text.push(')');
            }
            _ => merged.push(line),
        }
    }

    merged
}
