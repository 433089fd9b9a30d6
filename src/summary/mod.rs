pub mod keys;
pub mod merge;
pub mod model;
pub mod template;
