mod entity;
mod entity_type;
mod field_definition;
mod field_type;
mod field_value;
mod id_generator;

pub use entity::{Entity, CREATED_AT_FIELD, UPDATED_AT_FIELD};
pub use entity_type::{EntityTypeDefinition, EntityTypeUpdate};
pub use field_definition::FieldDefinition;
pub use field_type::FieldType;
pub use field_value::FieldValue;
pub use id_generator::IdGeneratorKind;
