pub mod compose;
pub mod condition;
pub mod field;
pub mod graph;
pub mod rule;

pub use compose::{CombinedSchema, ObjectSchema, UnknownKeys, compose};
pub use condition::{Condition, Predicate};
pub use field::{FieldDescriptor, GridHint, OptionsState, ResolvedField};
pub use graph::DependencyGraph;
pub use rule::{
    FieldKind, ListEncoding, NumberEncoding, NumberRule, OptionSource, SelectOption, SelectRule,
    SwitchEncoding, SwitchRule, TableRule, TextRule,
};
