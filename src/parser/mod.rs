//! 解析ゲートウェイ
//!
//! 外部の正確パーサー（サブプロセス）と行単位のフォールバックスキャナーを束ね、
//! どちらの経路でも同じ形のメタデータを返す。

pub mod cache;
pub mod exact;
pub mod fallback;
pub mod gateway;
pub mod kind;
pub mod limiter;
pub mod payload;

pub use cache::BoundedCache;
pub use exact::{ExactBackend, ExactInput, SubprocessBackend};
pub use gateway::{Parsed, ParserGateway, Strategy};
pub use kind::{
    Components, Controllers, Events, ExactAttribute, ExactUsage, Markup, MarkupMetadata,
    ParseKind, Routes, Schemas, Templates,
};
pub use limiter::ConcurrencyLimiter;
