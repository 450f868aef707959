pub mod confidence;
pub mod intent;
pub mod run;
pub mod stage;
