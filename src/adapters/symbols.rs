//! Symbol translation between canonical and venue formats
//!
//! Canonical form is `BASE-QUOTE-TYPE` (e.g. `BTC-USDC-PERP`). Each
//! venue gets a translator built from explicit mapping tables plus a
//! format rule for symbols the tables do not cover. Translation never
//! fails: the identity fallback returns the input unchanged and counts
//! the miss.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default TTL for cached translations
const CACHE_TTL_SECS: u64 = 3600;
/// Max cached translations before oldest-insertion eviction
const CACHE_MAX_ENTRIES: usize = 10_000;

/// How a venue writes its symbols when no explicit mapping exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStyle {
    /// `BTC-USD` (base, quote)
    BaseQuote,
    /// `BTC_USDC_PERP` (base, quote, contract type)
    BaseQuoteType,
    /// `BTCUSDT` (no separator)
    Concatenated,
}

/// Derivation rule applied when a symbol is absent from the mapping
/// tables.
#[derive(Debug, Clone)]
pub struct FormatRule {
    pub style: SymbolStyle,
    pub separator: String,
    /// Canonical quote -> venue quote (e.g. USDC -> USD)
    pub quote_substitutions: HashMap<String, String>,
    /// Quote assumed when the venue symbol carries none
    pub default_quote: String,
    /// Contract type assumed when the venue symbol carries none
    pub default_contract_type: String,
}

impl FormatRule {
    fn venue_quote_for(&self, canonical_quote: &str) -> String {
        self.quote_substitutions
            .get(canonical_quote)
            .cloned()
            .unwrap_or_else(|| canonical_quote.to_string())
    }

    fn canonical_quote_for(&self, venue_quote: &str) -> String {
        for (canonical, venue) in &self.quote_substitutions {
            if venue == venue_quote {
                return canonical.clone();
            }
        }
        venue_quote.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Direction {
    ToVenue,
    ToCanonical,
}

/// Hit/miss counters kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslationStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Translations that fell through to the identity fallback
    pub identity_fallbacks: u64,
}

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<(Direction, String), CacheEntry>,
    insertion_order: VecDeque<(Direction, String)>,
    stats: TranslationStats,
}

pub struct SymbolTranslator {
    exchange_id: String,
    /// canonical -> venue
    to_venue_map: HashMap<String, String>,
    /// venue -> canonical, consulted before the inverted to_venue_map
    to_canonical_map: HashMap<String, String>,
    rule: Option<FormatRule>,
    ttl: Duration,
    cache: Mutex<CacheState>,
}

impl SymbolTranslator {
    pub fn new(
        exchange_id: &str,
        to_venue_map: HashMap<String, String>,
        to_canonical_map: HashMap<String, String>,
        rule: Option<FormatRule>,
    ) -> Self {
        Self {
            exchange_id: exchange_id.to_string(),
            to_venue_map,
            to_canonical_map,
            rule,
            ttl: Duration::from_secs(CACHE_TTL_SECS),
            cache: Mutex::new(CacheState::default()),
        }
    }

    /// Canonical symbol to the venue's native format.
    pub fn to_venue(&self, canonical: &str) -> String {
        if let Some(cached) = self.cache_get(Direction::ToVenue, canonical) {
            return cached;
        }
        let result = self.translate_to_venue(canonical);
        self.cache_put(Direction::ToVenue, canonical, &result);
        result
    }

    /// Venue-native symbol to canonical format.
    pub fn to_canonical(&self, venue: &str) -> String {
        if let Some(cached) = self.cache_get(Direction::ToCanonical, venue) {
            return cached;
        }
        let result = self.translate_to_canonical(venue);
        self.cache_put(Direction::ToCanonical, venue, &result);
        result
    }

    pub fn stats(&self) -> TranslationStats {
        self.cache
            .lock()
            .map(|state| state.stats)
            .unwrap_or_default()
    }

    fn translate_to_venue(&self, canonical: &str) -> String {
        if let Some(mapped) = self.to_venue_map.get(canonical) {
            return mapped.clone();
        }
        // Inverted explicit table covers mappings declared the other way
        for (venue, canon) in &self.to_canonical_map {
            if canon == canonical {
                return venue.clone();
            }
        }
        if let Some(rule) = &self.rule {
            if let Some(derived) = derive_venue(canonical, rule) {
                return derived;
            }
        }
        self.identity_fallback(canonical)
    }

    fn translate_to_canonical(&self, venue: &str) -> String {
        if let Some(mapped) = self.to_canonical_map.get(venue) {
            return mapped.clone();
        }
        for (canon, mapped_venue) in &self.to_venue_map {
            if mapped_venue == venue {
                return canon.clone();
            }
        }
        if let Some(rule) = &self.rule {
            if let Some(derived) = derive_canonical(venue, rule) {
                return derived;
            }
        }
        self.identity_fallback(venue)
    }

    fn identity_fallback(&self, symbol: &str) -> String {
        if let Ok(mut state) = self.cache.lock() {
            state.stats.identity_fallbacks += 1;
        }
        tracing::debug!(
            exchange = %self.exchange_id,
            symbol = %symbol,
            "no mapping or rule matched, passing symbol through"
        );
        symbol.to_string()
    }

    fn cache_get(&self, direction: Direction, input: &str) -> Option<String> {
        let mut state = self.cache.lock().ok()?;
        let key = (direction, input.to_string());
        let hit = match state.entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            _ => None,
        };
        if hit.is_some() {
            state.stats.cache_hits += 1;
        } else {
            state.stats.cache_misses += 1;
        }
        hit
    }

    fn cache_put(&self, direction: Direction, input: &str, output: &str) {
        let Ok(mut state) = self.cache.lock() else {
            return;
        };
        while state.entries.len() >= CACHE_MAX_ENTRIES {
            match state.insertion_order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
        let key = (direction, input.to_string());
        if state
            .entries
            .insert(
                key.clone(),
                CacheEntry {
                    value: output.to_string(),
                    inserted_at: Instant::now(),
                },
            )
            .is_none()
        {
            state.insertion_order.push_back(key);
        }
    }
}

impl std::fmt::Debug for SymbolTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTranslator")
            .field("exchange_id", &self.exchange_id)
            .field("mappings", &self.to_venue_map.len())
            .finish()
    }
}

fn split_canonical(canonical: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> = canonical.split('-').collect();
    match parts.as_slice() {
        [base, quote, contract_type] => Some((
            (*base).to_string(),
            (*quote).to_string(),
            (*contract_type).to_string(),
        )),
        _ => None,
    }
}

fn derive_venue(canonical: &str, rule: &FormatRule) -> Option<String> {
    let (base, quote, contract_type) = split_canonical(canonical)?;
    let venue_quote = rule.venue_quote_for(&quote);
    let sep = &rule.separator;
    match rule.style {
        SymbolStyle::BaseQuote => Some(format!("{base}{sep}{venue_quote}")),
        SymbolStyle::BaseQuoteType => Some(format!("{base}{sep}{venue_quote}{sep}{contract_type}")),
        SymbolStyle::Concatenated => Some(format!("{base}{venue_quote}")),
    }
}

fn derive_canonical(venue: &str, rule: &FormatRule) -> Option<String> {
    match rule.style {
        SymbolStyle::BaseQuote => {
            let (base, venue_quote) = venue.split_once(rule.separator.as_str())?;
            if base.is_empty() || venue_quote.is_empty() || venue_quote.contains(&rule.separator) {
                return None;
            }
            let quote = rule.canonical_quote_for(venue_quote);
            Some(format!("{base}-{quote}-{}", rule.default_contract_type))
        }
        SymbolStyle::BaseQuoteType => {
            let parts: Vec<&str> = venue.split(rule.separator.as_str()).collect();
            let [base, venue_quote, contract_type] = parts.as_slice() else {
                return None;
            };
            let quote = rule.canonical_quote_for(venue_quote);
            Some(format!("{base}-{quote}-{contract_type}"))
        }
        SymbolStyle::Concatenated => {
            // Strip a known quote suffix; venue quotes come from the
            // substitution table plus the default
            let mut candidates: Vec<String> =
                rule.quote_substitutions.values().cloned().collect();
            candidates.push(rule.default_quote.clone());
            candidates.sort_by_key(|q| std::cmp::Reverse(q.len()));
            for venue_quote in candidates {
                if let Some(base) = venue.strip_suffix(venue_quote.as_str()) {
                    if base.is_empty() {
                        continue;
                    }
                    let quote = rule.canonical_quote_for(&venue_quote);
                    return Some(format!("{base}-{quote}-{}", rule.default_contract_type));
                }
            }
            None
        }
    }
}
