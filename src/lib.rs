//! Forward and backward operators for reverse-mode automatic differentiation.
//!
//! This library provides the edge layer of a computation graph:
//! - A closed catalog of operators ([`Edge`]) with their configuration
//! - Forward passes that return the output plus any saved [`Context`]
//! - Backward passes producing one input's gradient contribution
//! - Numerically stable activation and softmax kernels
//!
//! # Features
//! - `debug_logs` - Prints edge dispatch to stdout
//! - `serialization` - Serde support for [`Array`] and [`Edge`]
//! - `cpu_openblas` - Uses OpenBLAS for matrix products
//!
//! # Example
//! ```rust
//! use tensor_edges::{Array, Edge};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let x = Array::column(vec![1.0, 5.0, 2.0, 4.0]);
//!     let edge = Edge::MaxPooling1D { width: 2 };
//!
//!     // Forward pass returns the output and what backward needs
//!     let fwd = edge.forward(&[&x])?;
//!     assert_eq!(fwd.output.to_vec(), vec![5.0, 4.0]);
//!
//!     // Backward pass for input 0
//!     let grad = Array::column(vec![10.0, 20.0]);
//!     let dx = edge.backward(&[&x], &fwd.output, &fwd.context, &grad, 0)?;
//!     assert_eq!(dx.to_vec(), vec![0.0, 10.0, 0.0, 20.0]);
//!     Ok(())
//! }
//! ```

// --- Central debug_println macro definition ---
/// Conditional logging macro. Prints if 'debug_logs' feature is enabled.
#[cfg(feature = "debug_logs")]
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        ::std::println!("[DEBUG {}] {}", module_path!(), ::std::format_args!($($arg)*))
    };
}

/// Conditional logging macro (disabled version). Does nothing.
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {};
}

// Pulls in the BLAS provider that ndarray's `blas` feature expects.
#[cfg(feature = "cpu_openblas")]
extern crate openblas_src;

// Declare the modules within the crate
pub mod array;
pub mod edge;
pub mod error;
pub mod init;
pub mod kernels;
pub mod ops;

pub mod test_utils;

// Re-export the public types for easier use by consumers of the library
pub use array::Array;
pub use edge::{Arity, Context, Edge, Forward};
pub use error::Error;
