pub mod gather;
pub mod screen;
