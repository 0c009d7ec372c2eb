pub mod convert;
pub mod describe;
pub mod index;
pub mod render;
pub mod run;
