mod mongodb;

pub use mongodb::*;
