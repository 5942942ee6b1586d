// This file is the module declaration file for the `core` module.
// In Rust, a `mod.rs` file within a directory (e.g., `src/core/`)
// serves two main purposes:
//
// 1. It declares the submodules contained within that directory.
// 2. It exposes these submodules to the parent module (`src/` in this case),
//    making them accessible to the entire crate.

// `config` module:
// This module is responsible for managing the application's configuration.
// It defines the data structures for the configuration file (`BuilderConfig`),
// provides a `ConfigProvider` trait for abstracting configuration access, and
// includes a `ConfigManager` to handle loading, saving and exporting it.
pub mod config;

// `engine` module:
// The `ScriptAssembler`, which renders a hook registry into the final
// shell script with its fixed frame around the payload and error chains.
pub mod engine;

// `environment` module:
// Queuing system flavours (Torque, Slurm, local runs) and the read-only
// `Environment` every hook renders against.
pub mod environment;
pub mod error;

// `resources` module:
// The resource request (processors, memory, walltime, file lists) and the
// parsers for the size and time units users type.
pub mod resources;
