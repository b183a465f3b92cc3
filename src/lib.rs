pub mod assembler;
pub mod codegen;
pub mod driver;
pub mod environment;
pub mod error;
pub mod exec_memory;
pub mod report;
pub mod template;
pub mod timer;
