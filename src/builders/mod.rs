// This file is the module declaration file for the `builders` module.
// It declares and makes public all the sub-modules within the `src/builders`
// directory. These modules encapsulate the pieces a job script is built from.

// `patterns` module:
// Lexical helpers shared by the input-file importers: comment stripping for
// languages where one marker opens and closes a comment, and quote-aware
// splitting of a line into words.
pub mod patterns;

// `sections` module:
// The explicit state machine that splits a token stream into
// `%name ... end` sections while tracking nested blocks.
pub mod sections;

// `directives` module:
// Parses `key=value` directive lines (e.g. `#QSYS np=4`) out of an input
// file and fills the unset fields of the resource request from them.
pub mod directives;

// `importer` module:
// The input-file extractors. It defines the `InputImporter` trait, the ORCA
// and Q-Chem readers, and `fold_hints`, which merges recovered resource
// hints into the resource request.
pub mod importer;

// `hooks` module:
// The `Hook` trait, the priority-ordered `HookRegistry` with its payload and
// error chains, and the standard staging, retrieval and cleanup hooks.
pub mod hooks;

// `payload` module:
// The hooks that run the actual work: a plain command, ORCA or Q-Chem.
pub mod payload;

// `jobs` module:
// Job types. Each one completes the resource request from its input and
// registers its hooks.
pub mod jobs;

// `reporter` module:
// Collects non-fatal diagnostics in order and reports them through the log.
pub mod reporter;

// `storage` module:
// Destinations for the finished script (stdout, file, memory) and handing
// a written script to the queuing system.
pub mod storage;

// `validator` module:
// Fatal checks on the job as given on the commandline, and non-fatal checks
// on the prepared resource request.
pub mod validator;
