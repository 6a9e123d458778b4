//! An LC-3 toolchain and execution engine: assembler, linker,
//! simulator, and debugger plumbing for frontends.
//!
//! The crate is split along the toolchain's phases:
//! - [`parse`]: source text to AST
//! - [`asm`]: AST to object files (plus the on-disk object format and
//!   raw `.bin` conversion)
//! - [`link`]: merging object files and resolving external labels
//! - [`sim`]: the machine itself (fetch/decode/execute, devices,
//!   breakpoints, call frames)
//! - [`ctrl`]: running the machine on a worker thread
//! - [`engine`]: a facade bundling all of the above for a debugger UI
//! - [`err`]: the shared error-reporting interface
//!
//! # Usage
//!
//! To convert LC-3 source code to an object file, it must be parsed and
//! assembled:
//! ```
//! use lc3_forge::parse::parse_ast;
//! use lc3_forge::asm::{assemble, assemble_debug, ObjectFile};
//!
//! let code = "
//!     .orig x3000
//!     AND R0, R0, #0
//!     ADD R0, R0, #7
//!     HALT
//!     .end
//! ";
//! let ast = parse_ast(code).unwrap();
//!
//! // Assemble AST into object file:
//! # {
//! # let ast = ast.clone();
//! let obj_file: ObjectFile = assemble(ast).unwrap();
//! # }
//! // OR, keeping debug symbols for source-level views:
//! let obj_file: ObjectFile = assemble_debug(ast, code).unwrap();
//! ```
//!
//! Once an object file has been created, it can be executed with the
//! simulator:
//! ```
//! # use lc3_forge::parse::parse_ast;
//! # use lc3_forge::asm::assemble_debug;
//! #
//! # let code = ".orig x3000\nHALT\n.end";
//! # let ast = parse_ast(code).unwrap();
//! # let obj_file = assemble_debug(ast, code).unwrap();
//! #
//! use lc3_forge::sim::Simulator;
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.load_obj_file(&obj_file).unwrap();
//! simulator.run().unwrap(); // <-- Result can be handled accordingly
//! ```
//!
//! If more granularity is needed for simulation, there are also
//! step-in, step-over, and step-out functions; see the [`sim`] module.
//! For driving all of this from a UI (worker-thread execution,
//! register/memory access by name, console buffers), start at
//! [`engine::Engine`].
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod link;
pub mod sim;
pub mod ctrl;
pub mod engine;
pub mod err;
