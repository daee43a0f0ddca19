pub mod component;
pub mod controller;
pub mod event;
pub mod route;
pub mod schema;
pub mod template;
pub mod usage;

pub use component::{Component, ComponentAttribute, ComponentSlot, INNER_BLOCK};
pub use controller::{ControllerAction, ControllerInfo, RenderAssign, RenderInfo};
pub use event::{Event, EventKind, NameKind};
pub use route::{ResourceOptions, Route};
pub use schema::{Association, AssociationType, SchemaField, SchemaInfo};
pub use template::{TemplateInfo, TemplateKind};
pub use usage::{ComponentUsage, UsageAttribute, UsageSlot};
