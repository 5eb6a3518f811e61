//! MTA subway feed sources and the line → feed routing table.
//!
//! Each feed source covers a group of lines that share one upstream
//! endpoint. All endpoints live under one base URL:
//! `https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs{suffix}`

use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_FEED_BASE_URL: &str = "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedSource {
    Ace,
    Bdfm,
    G,
    Jz,
    Nqrw,
    L,
    Numbered,
    Sir,
}

impl FeedSource {
    pub const ALL: [FeedSource; 8] = [
        FeedSource::Ace,
        FeedSource::Bdfm,
        FeedSource::G,
        FeedSource::Jz,
        FeedSource::Nqrw,
        FeedSource::L,
        FeedSource::Numbered,
        FeedSource::Sir,
    ];

    /// Path of the feed relative to the feed base URL.
    pub fn path(&self) -> &'static str {
        match self {
            FeedSource::Ace => "nyct%2Fgtfs-ace",
            FeedSource::Bdfm => "nyct%2Fgtfs-bdfm",
            FeedSource::G => "nyct%2Fgtfs-g",
            FeedSource::Jz => "nyct%2Fgtfs-jz",
            FeedSource::Nqrw => "nyct%2Fgtfs-nqrw",
            FeedSource::L => "nyct%2Fgtfs-l",
            FeedSource::Numbered => "nyct%2Fgtfs",
            FeedSource::Sir => "nyct%2Fgtfs-si",
        }
    }

    /// Full endpoint URL under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.path())
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeedSource::Ace => "ace",
            FeedSource::Bdfm => "bdfm",
            FeedSource::G => "g",
            FeedSource::Jz => "jz",
            FeedSource::Nqrw => "nqrw",
            FeedSource::L => "l",
            FeedSource::Numbered => "numbered",
            FeedSource::Sir => "sir",
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Feed sources that may carry trip updates for `line`.
///
/// The shuttle `S` shows up in two feeds. Unknown lines map to no feeds.
pub fn feeds_for_line(line: &str) -> &'static [FeedSource] {
    match line.to_uppercase().as_str() {
        "A" | "C" | "E" | "H" | "SR" => &[FeedSource::Ace],
        "B" | "D" | "F" | "FX" | "M" | "SF" => &[FeedSource::Bdfm],
        "G" => &[FeedSource::G],
        "J" | "Z" => &[FeedSource::Jz],
        "N" | "Q" | "R" | "W" => &[FeedSource::Nqrw],
        "L" => &[FeedSource::L],
        "1" | "2" | "3" | "4" | "5" | "6" | "6X" | "7" | "7X" => &[FeedSource::Numbered],
        "S" => &[FeedSource::Numbered, FeedSource::Bdfm],
        "SIR" => &[FeedSource::Sir],
        _ => &[],
    }
}

/// Deduplicated feed sources needed to cover every line in `lines`.
pub fn feeds_for_lines<'a, I>(lines: I) -> BTreeSet<FeedSource>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .flat_map(|line| feeds_for_line(line).iter().copied())
        .collect()
}
