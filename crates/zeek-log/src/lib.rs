mod files;
mod grouping;
mod header;
mod http;

pub use files::{gather_log_files, open_log_reader};
pub use grouping::{ProxyPairAggregator, DEFAULT_STROBE_LIMIT, MIN_TS_SAMPLES};
pub use header::TsvHeader;
pub use http::{parse_json_line, parse_tsv_line, read_http_log, HttpRecord};
