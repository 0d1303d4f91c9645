//! Constructor-resolution factory
//!
//! Builds arbitrary values for tests by picking a constructor from a
//! [`TypeDescriptor`] and resolving each of its parameters from, in order:
//!
//! 1. explicit values supplied by the caller (first assignable one wins)
//! 2. the test output handle
//! 3. the owning fixture
//! 4. the keyed registry, for parameters marked with a key
//! 5. the general registry
//!
//! Candidates are tried richest first (most parameters). A candidate whose
//! required parameters cannot all be bound, or whose constructor returns an
//! error, is abandoned and the next one is tried. Registry side effects of
//! abandoned candidates (e.g. a lazily created singleton) are not undone.
//!
//! ```rust
//! use std::sync::Arc;
//! use testbed::factory::{create_instance, Arg, Parameter, ResolutionContext, TypeDescriptor};
//! use testbed::logging::{NullOutput, TestOutput};
//! use testbed_di::DIContainer;
//!
//! struct Greeting {
//!     text: String,
//! }
//!
//! let registry = DIContainer::new();
//! registry.register(|_| Ok(Arc::new("hello".to_string()))).unwrap();
//!
//! let descriptor = TypeDescriptor::<Greeting>::new().constructor(
//!     vec![Parameter::of::<String>()],
//!     |args| Ok(Greeting { text: args.take::<String>()?.to_string() }),
//! );
//!
//! let output: Arc<dyn TestOutput> = Arc::new(NullOutput);
//! let context = ResolutionContext::new(Arg::value(()), &registry, output, &[]);
//! let greeting = create_instance(&descriptor, &context).unwrap();
//! assert_eq!(greeting.text, "hello");
//! ```

mod context;
mod descriptor;
pub mod resolver;

use std::fmt;

use tracing::debug;

pub use context::{Arg, ResolutionContext};
pub use descriptor::{
    Arguments, Construct, ConstructorCandidate, Parameter, ParameterDefault, TypeDescriptor,
    Visibility,
};
pub use resolver::{resolve_arguments, resolve_parameter, Binding, Resolution, Source};

/// Why one candidate was abandoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// A required parameter had no value from any source
    UnresolvedParameter {
        index: usize,
        declared: &'static str,
        key: Option<String>,
    },
    /// The constructor itself returned an error
    InvocationFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UnresolvedParameter {
                index,
                declared,
                key: Some(key),
            } => write!(f, "parameter {index} ({declared}, key {key:?}) could not be resolved"),
            FailureReason::UnresolvedParameter {
                index,
                declared,
                key: None,
            } => write!(f, "parameter {index} ({declared}) could not be resolved"),
            FailureReason::InvocationFailed(message) => {
                write!(f, "constructor failed: {message}")
            }
        }
    }
}

/// One abandoned candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub signature: String,
    pub reason: FailureReason,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.signature, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unable to create instance of {type_name}: {}", describe_attempts(.attempts))]
    Unresolvable {
        type_name: &'static str,
        attempts: Vec<CandidateFailure>,
    },
}

fn describe_attempts(attempts: &[CandidateFailure]) -> String {
    if attempts.is_empty() {
        return "no constructors declared".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Candidates in the order they are tried: descending arity, ties in declaration order
pub fn ordered_candidates<T>(descriptor: &TypeDescriptor<T>) -> Vec<&ConstructorCandidate<T>> {
    let mut candidates: Vec<_> = descriptor.constructors().iter().collect();
    candidates.sort_by(|a, b| b.arity().cmp(&a.arity()));
    candidates
}

/// Build a `T` from the first candidate that resolves and constructs successfully
pub fn create_instance<T>(
    descriptor: &TypeDescriptor<T>,
    context: &ResolutionContext<'_>,
) -> Result<T, FactoryError> {
    let mut attempts = Vec::new();

    for candidate in ordered_candidates(descriptor) {
        let mut arguments = match resolve_arguments(candidate, context) {
            Resolution::Viable(arguments) => arguments,
            Resolution::NotViable(failure) => {
                debug!(
                    target_type = descriptor.type_name(),
                    candidate = %failure.signature,
                    reason = %failure.reason,
                    "Skipping constructor"
                );
                attempts.push(failure);
                continue;
            }
        };

        match candidate.invoke(&mut arguments) {
            Ok(instance) => {
                debug!(
                    target_type = descriptor.type_name(),
                    candidate = %candidate.signature(),
                    "Constructed instance"
                );
                return Ok(instance);
            }
            Err(err) => {
                let failure = CandidateFailure {
                    signature: candidate.signature(),
                    reason: FailureReason::InvocationFailed(format!("{err:#}")),
                };
                debug!(
                    target_type = descriptor.type_name(),
                    candidate = %failure.signature,
                    reason = %failure.reason,
                    "Constructor failed, trying next candidate"
                );
                attempts.push(failure);
            }
        }
    }

    Err(FactoryError::Unresolvable {
        type_name: descriptor.type_name(),
        attempts,
    })
}

/// [`create_instance`] for types that describe themselves
pub fn create<T: Construct>(context: &ResolutionContext<'_>) -> Result<T, FactoryError> {
    create_instance(&T::descriptor(), context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{CapturedOutput, TestOutput};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use testbed_di::DIContainer;

    fn output() -> Arc<dyn TestOutput> {
        Arc::new(CapturedOutput::new())
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let descriptor = TypeDescriptor::<&'static str>::new()
            .constructor(vec![Parameter::of::<u8>()], |_| Ok("first"))
            .constructor(vec![], |_| Ok("empty"))
            .constructor(vec![Parameter::of::<u16>()], |_| Ok("second"));

        let order: Vec<_> = ordered_candidates(&descriptor)
            .into_iter()
            .map(|c| c.signature())
            .collect();
        assert_eq!(order, vec!["(u8)", "(u16)", "()"]);
    }

    #[test]
    fn test_attempted_arities_descend() {
        let tried = Arc::new(Mutex::new(Vec::new()));
        let log = |arity: usize| {
            let tried = tried.clone();
            move |_: &mut Arguments| -> anyhow::Result<usize> {
                tried.lock().push(arity);
                anyhow::bail!("refusing arity {arity}")
            }
        };

        let descriptor = TypeDescriptor::<usize>::new()
            .constructor(vec![], log(0))
            .constructor(vec![Parameter::optional::<u8>()], log(1))
            .non_public_constructor(
                vec![
                    Parameter::optional::<u8>(),
                    Parameter::optional::<u16>(),
                    Parameter::optional::<u32>(),
                ],
                log(3),
            );

        let registry = DIContainer::new();
        let context = ResolutionContext::new(Arg::value(()), &registry, output(), &[]);
        let err = create_instance(&descriptor, &context).unwrap_err();

        assert_eq!(*tried.lock(), vec![3, 1, 0]);
        let FactoryError::Unresolvable { attempts, .. } = err;
        assert_eq!(attempts.len(), 3);
    }

    #[test]
    fn test_no_constructors_is_unresolvable() {
        let descriptor = TypeDescriptor::<u8>::new();
        let registry = DIContainer::new();
        let context = ResolutionContext::new(Arg::value(()), &registry, output(), &[]);

        let err = create_instance(&descriptor, &context).unwrap_err();
        assert!(err.to_string().contains("no constructors declared"));
    }

    #[test]
    fn test_default_value_fills_unresolved_parameter() {
        let descriptor = TypeDescriptor::<u32>::new().constructor(
            vec![Parameter::with_default(|| Arc::new(11_u32))],
            |args| Ok(*args.take::<u32>()?),
        );
        let registry = DIContainer::new();
        let context = ResolutionContext::new(Arg::value(()), &registry, output(), &[]);

        assert_eq!(create_instance(&descriptor, &context).unwrap(), 11);
    }
}
