pub mod phx_config;
pub mod source_filter;

pub use source_filter::SourceFilter;
pub use phx_config::{
    DISABLE_EXACT_PARSER_ENV, DiagnosticsConfig, ParserConfig, PhxConfig, env_flag_set,
};
