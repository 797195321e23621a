pub mod synthetic_source;
