//! Per-parameter strategy chain

use testbed_di::ServiceHandle;

use super::context::ResolutionContext;
use super::descriptor::{Arguments, ConstructorCandidate, Parameter, ParameterDefault};
use super::{CandidateFailure, FailureReason};

/// Which source supplied a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Explicit(usize),
    DiagnosticSink,
    Owner,
    KeyedRegistry,
    Registry,
}

/// Outcome of resolving one parameter. `value` is `None` when the registry had nothing.
#[derive(Debug)]
pub struct Binding {
    pub source: Source,
    pub value: Option<ServiceHandle>,
}

/// Outcome of resolving a whole parameter list
#[derive(Debug)]
pub enum Resolution {
    Viable(Arguments),
    NotViable(CandidateFailure),
}

/// Resolve one parameter; the first applicable source wins
pub fn resolve_parameter(parameter: &Parameter, context: &ResolutionContext<'_>) -> Binding {
    let declared = parameter.declared_type();

    // First assignable explicit value wins. Values are not consumed, so one
    // value may satisfy several parameters.
    if let Some((index, handle)) = context
        .explicit_values()
        .iter()
        .enumerate()
        .find_map(|(index, arg)| arg.view(declared).map(|handle| (index, handle)))
    {
        return Binding {
            source: Source::Explicit(index),
            value: Some(handle.clone()),
        };
    }

    if let Some(handle) = context.diagnostic_sink().view(declared) {
        return Binding {
            source: Source::DiagnosticSink,
            value: Some(handle.clone()),
        };
    }

    if let Some(handle) = context.owner().view(declared) {
        return Binding {
            source: Source::Owner,
            value: Some(handle.clone()),
        };
    }

    match parameter.key() {
        Some(key) => Binding {
            source: Source::KeyedRegistry,
            value: context.lookup_keyed(declared, key),
        },
        None => Binding {
            source: Source::Registry,
            value: context.lookup(declared),
        },
    }
}

/// Resolve every parameter of `candidate`, stopping at the first required one left unbound
pub fn resolve_arguments<T>(
    candidate: &ConstructorCandidate<T>,
    context: &ResolutionContext<'_>,
) -> Resolution {
    let parameters = candidate.parameters();
    let mut slots = Vec::with_capacity(parameters.len());

    for (index, parameter) in parameters.iter().enumerate() {
        let binding = resolve_parameter(parameter, context);

        let slot = match (binding.value, parameter.default_value()) {
            (Some(value), _) => Some(value),
            (None, ParameterDefault::Value(produce)) => Some(produce()),
            (None, ParameterDefault::Absent) => None,
            (None, ParameterDefault::Required) => {
                return Resolution::NotViable(CandidateFailure {
                    signature: candidate.signature(),
                    reason: FailureReason::UnresolvedParameter {
                        index,
                        declared: parameter.declared_type().name(),
                        key: parameter.key().map(str::to_string),
                    },
                });
            }
        };
        slots.push(slot);
    }

    Resolution::Viable(Arguments::new(
        slots,
        parameters.iter().map(|p| *p.declared_type()).collect(),
    ))
}
