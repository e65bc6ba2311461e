pub mod block;
pub mod summary;

pub use block::{
    extract_stats_block, render_stats_block, Performance, StatsBlockError, TestStats,
    STATS_JSON_END, STATS_JSON_START,
};
pub use summary::{aggregate, Aggregate, StatsSummary, TimingSummary, FAIL_SENTINEL, PASS_SENTINEL};
