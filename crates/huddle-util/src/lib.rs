pub mod pagination;
pub mod snowflake;
pub mod text;
pub mod validation;
