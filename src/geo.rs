// src/geo.rs
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

pub const UNKNOWN_LOCATION: &str = "unknown";

lazy_static! {
    static ref COUNTRY_CODES: BTreeMap<&'static str, &'static str> = [
        ("AR", "Argentina"),
        ("AT", "Austria"),
        ("AU", "Australia"),
        ("BE", "Belgium"),
        ("BG", "Bulgaria"),
        ("BR", "Brazil"),
        ("BY", "Belarus"),
        ("CA", "Canada"),
        ("CH", "Switzerland"),
        ("CL", "Chile"),
        ("CN", "China"),
        ("CZ", "Czechia"),
        ("DE", "Germany"),
        ("DK", "Denmark"),
        ("EE", "Estonia"),
        ("ES", "Spain"),
        ("FI", "Finland"),
        ("FR", "France"),
        ("GB", "United Kingdom"),
        ("GR", "Greece"),
        ("HK", "Hong Kong"),
        ("HU", "Hungary"),
        ("IE", "Ireland"),
        ("IL", "Israel"),
        ("IN", "India"),
        ("IS", "Iceland"),
        ("IT", "Italy"),
        ("JP", "Japan"),
        ("KR", "South Korea"),
        ("KZ", "Kazakhstan"),
        ("LT", "Lithuania"),
        ("LU", "Luxembourg"),
        ("LV", "Latvia"),
        ("MX", "Mexico"),
        ("NL", "Netherlands"),
        ("NO", "Norway"),
        ("NZ", "New Zealand"),
        ("PL", "Poland"),
        ("PT", "Portugal"),
        ("RO", "Romania"),
        ("RS", "Serbia"),
        ("RU", "Russia"),
        ("SE", "Sweden"),
        ("SG", "Singapore"),
        ("SK", "Slovakia"),
        ("TR", "Turkey"),
        ("TW", "Taiwan"),
        ("UA", "Ukraine"),
        ("US", "United States"),
        ("ZA", "South Africa"),
    ]
    .into_iter()
    .collect();
}

/// Location code → country name, for the presentation layer's flag icons.
pub fn country_codes() -> &'static BTreeMap<&'static str, &'static str> {
    &COUNTRY_CODES
}

/// Ranges bucketed by prefix length, longest first. A lookup masks the
/// address once per distinct prefix length instead of scanning every range.
#[derive(Debug, Default)]
struct RangeIndex {
    levels: Vec<(u8, HashMap<IpAddr, String>)>,
    len: usize,
}

impl RangeIndex {
    fn build(ranges: Vec<(IpNetwork, String)>) -> Self {
        let mut by_prefix: BTreeMap<u8, HashMap<IpAddr, String>> = BTreeMap::new();
        for (network, code) in ranges {
            by_prefix
                .entry(network.prefix())
                .or_default()
                .insert(network.network(), code);
        }
        let len = by_prefix.values().map(HashMap::len).sum();
        Self {
            levels: by_prefix.into_iter().rev().collect(),
            len,
        }
    }

    fn lookup(&self, ip: IpAddr) -> Option<&str> {
        self.levels.iter().find_map(|(prefix, networks)| {
            let masked = IpNetwork::new(ip, *prefix).ok()?.network();
            networks.get(&masked).map(String::as_str)
        })
    }
}

#[derive(Debug, Default)]
pub struct GeoResolver {
    index: RwLock<RangeIndex>,
}

impl GeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges_text(text: &str) -> Self {
        let resolver = Self::new();
        resolver.replace_ranges(parse_ranges(text));
        resolver
    }

    /// Number of distinct ranges loaded.
    pub fn len(&self) -> usize {
        self.index.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn replace_ranges(&self, ranges: Vec<(IpNetwork, String)>) {
        let index = RangeIndex::build(ranges);
        *self.index.write() = index;
    }

    /// Longest-prefix match over the loaded ranges.
    pub fn resolve(&self, ip: IpAddr) -> String {
        self.index
            .read()
            .lookup(ip)
            .unwrap_or(UNKNOWN_LOCATION)
            .to_string()
    }

    pub async fn load_file(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let text = tokio::fs::read_to_string(path).await?;
        self.replace_ranges(parse_ranges(&text));
        let count = self.len();
        info!("Loaded {} geolocation ranges from {}", count, path.display());
        Ok(count)
    }

    pub async fn fetch(&self, url: &str) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let response = reqwest::get(url).await?.error_for_status()?;
        let text = response.text().await?;
        self.replace_ranges(parse_ranges(&text));
        let count = self.len();
        info!("Loaded {} geolocation ranges from {}", count, url);
        Ok(count)
    }
}

/// Parses `<cidr>,<code>` lines. Blank lines and `#` comments are ignored;
/// malformed lines are skipped.
pub fn parse_ranges(text: &str) -> Vec<(IpNetwork, String)> {
    let mut ranges = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((cidr, code)) = line.split_once(',') else {
            warn!("Skipping geolocation line without code: {}", line);
            continue;
        };
        let code = code.trim();
        match IpNetwork::from_str(cidr.trim()) {
            Ok(network) if !code.is_empty() => ranges.push((network, code.to_ascii_uppercase())),
            _ => warn!("Skipping malformed geolocation line: {}", line),
        }
    }
    ranges
}
