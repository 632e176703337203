//! Per-job token accounting (spec §3, §4.K).

/// Token counters for one job. `provider_total_tokens` is a derived
/// invariant (`= prompt + completion`), recomputed rather than stored
/// independently so it can never drift.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenStats {
    pub chunking_total_tokens: u64,
    pub chunking_total_chunks: u64,
    pub provider_prompt_tokens: u64,
    pub provider_completion_tokens: u64,
}

impl TokenStats {
    pub fn provider_total_tokens(&self) -> u64 {
        self.provider_prompt_tokens + self.provider_completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_derived_not_stored() {
        let stats = TokenStats {
            provider_prompt_tokens: 120,
            provider_completion_tokens: 80,
            ..Default::default()
        };
        assert_eq!(stats.provider_total_tokens(), 200);
    }
}
