
//! Compile-time rewriting of C# numeric and LINQ call sites.
//!
//! A [`CompilationUnit`](driver::CompilationUnit) is parsed from source
//! text, each method body is optimized under its
//! [`EvaluationMode`](optimizer::EvaluationMode), and the result is
//! emitted together with any helper methods the rewrites introduced.

pub mod ast;
pub mod driver;
pub mod errorlist;
pub mod eval;
pub mod host;
pub mod optimizer;
pub mod parsing;
pub mod value;

pub use driver::{optimize_expression, CompilationUnit, Diagnostic, OptimizedExpression, OptimizedUnit};
pub use optimizer::{EvaluationMode, OptimizerConfig};
