// Matcher tuning for the line-oriented block matcher.

/// Longest block the base and target are split into.
pub const MAX_BLOCK: usize = 90;

/// Shortest copy worth emitting; anything shorter becomes a literal.
pub const MIN_MATCH: usize = 4;

/// A candidate longer than `base_len / LONG_ENOUGH_DIVISOR` ends the search.
pub const LONG_ENOUGH_DIVISOR: usize = 5;

/// Matcher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Blocks end after a line feed or after this many bytes.
    pub max_block: usize,
    /// Minimum COPY length.
    pub min_match: usize,
    /// Stop probing candidates once a match exceeds
    /// `base_len / long_enough_divisor`. Zero disables the early exit.
    pub long_enough_divisor: usize,
}

impl MatcherConfig {
    /// Match length that ends the candidate search for a base of `base_len`.
    pub fn long_enough(&self, base_len: usize) -> usize {
        match self.long_enough_divisor {
            0 => usize::MAX,
            divisor => base_len / divisor,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_block: MAX_BLOCK,
            min_match: MIN_MATCH,
            long_enough_divisor: LONG_ENOUGH_DIVISOR,
        }
    }
}
