//! Constructor descriptors
//!
//! A [`TypeDescriptor`] lists the constructors the factory may choose from.
//! Each [`ConstructorCandidate`] declares its parameters up front and carries
//! a closure that builds the value from the resolved [`Arguments`].

use std::fmt;
use std::sync::Arc;

use testbed_di::{downcast, erase, ServiceHandle, TypeKey};

type DefaultProducer = Arc<dyn Fn() -> ServiceHandle + Send + Sync>;
type Invoke<T> = Box<dyn Fn(&mut Arguments) -> anyhow::Result<T> + Send + Sync>;

/// What happens when no source can supply a parameter
#[derive(Clone, Default)]
pub enum ParameterDefault {
    /// The candidate is not viable without a value
    #[default]
    Required,
    /// The slot is left empty; the constructor reads it with [`Arguments::take_optional`]
    Absent,
    /// The slot is filled from the producer
    Value(DefaultProducer),
}

impl fmt::Debug for ParameterDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterDefault::Required => f.write_str("Required"),
            ParameterDefault::Absent => f.write_str("Absent"),
            ParameterDefault::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// One formal constructor parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    declared: TypeKey,
    default: ParameterDefault,
    key: Option<String>,
}

impl Parameter {
    /// A required parameter receiving an `Arc<T>`
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            declared: TypeKey::of::<T>(),
            default: ParameterDefault::Required,
            key: None,
        }
    }

    /// A parameter that may be left empty when nothing resolves
    pub fn optional<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            default: ParameterDefault::Absent,
            ..Self::of::<T>()
        }
    }

    /// A parameter falling back to `produce()` when nothing resolves
    pub fn with_default<T, F>(produce: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            default: ParameterDefault::Value(Arc::new(move || erase(produce()))),
            ..Self::of::<T>()
        }
    }

    /// Resolve this parameter from the keyed registry only.
    ///
    /// A parameter carries at most one key; calling this again replaces it.
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn declared_type(&self) -> &TypeKey {
        &self.declared
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn default_value(&self) -> &ParameterDefault {
        &self.default
    }

    pub fn has_default(&self) -> bool {
        !matches!(self.default, ParameterDefault::Required)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "[keyed:{key:?}] {}", self.declared),
            None => write!(f, "{}", self.declared),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    NonPublic,
}

/// Resolved argument list, one slot per parameter in parameter order.
///
/// Constructors consume the slots front to back with [`Arguments::take`] and
/// [`Arguments::take_optional`].
pub struct Arguments {
    slots: Vec<Option<ServiceHandle>>,
    declared: Vec<TypeKey>,
    cursor: usize,
}

impl Arguments {
    pub(crate) fn new(slots: Vec<Option<ServiceHandle>>, declared: Vec<TypeKey>) -> Self {
        Self {
            slots,
            declared,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether slot `index` holds a value
    pub fn is_bound(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Take the next argument, which must be present
    pub fn take<T: ?Sized + Send + Sync + 'static>(&mut self) -> anyhow::Result<Arc<T>> {
        let index = self.cursor;
        self.take_optional::<T>()?.ok_or_else(|| {
            anyhow::anyhow!(
                "argument {} ({}) is absent",
                index,
                std::any::type_name::<T>()
            )
        })
    }

    /// Take the next argument, which may be absent
    pub fn take_optional<T: ?Sized + Send + Sync + 'static>(
        &mut self,
    ) -> anyhow::Result<Option<Arc<T>>> {
        let index = self.cursor;
        let slot = self.slots.get(index).ok_or_else(|| {
            anyhow::anyhow!(
                "constructor read argument {} but only {} were declared",
                index,
                self.slots.len()
            )
        })?;
        self.cursor += 1;

        match slot {
            None => Ok(None),
            Some(handle) => downcast::<T>(handle).map(Some).ok_or_else(|| {
                anyhow::anyhow!(
                    "argument {} was declared as {} but read as {}",
                    index,
                    self.declared[index],
                    std::any::type_name::<T>()
                )
            }),
        }
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("declared", &self.declared)
            .field(
                "bound",
                &self.slots.iter().map(Option::is_some).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// One constructor of a target type
pub struct ConstructorCandidate<T> {
    parameters: Vec<Parameter>,
    visibility: Visibility,
    invoke: Invoke<T>,
}

impl<T> ConstructorCandidate<T> {
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub(crate) fn invoke(&self, arguments: &mut Arguments) -> anyhow::Result<T> {
        (self.invoke)(arguments)
    }

    /// Signature text used in diagnostics, e.g. `(dyn Calculator, [keyed:"red"] Paint)`
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("({params})")
    }
}

impl<T> fmt::Debug for ConstructorCandidate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorCandidate")
            .field("signature", &self.signature())
            .field("visibility", &self.visibility)
            .finish()
    }
}

/// Every constructor the factory may use to build a `T`, in declaration order
pub struct TypeDescriptor<T> {
    type_name: &'static str,
    constructors: Vec<ConstructorCandidate<T>>,
}

impl<T: 'static> TypeDescriptor<T> {
    pub fn new() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            constructors: Vec::new(),
        }
    }

    /// Declare a public constructor
    pub fn constructor<F>(self, parameters: Vec<Parameter>, invoke: F) -> Self
    where
        F: Fn(&mut Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.push(parameters, Visibility::Public, invoke)
    }

    /// Declare a constructor callers outside the type's module could not reach directly
    pub fn non_public_constructor<F>(self, parameters: Vec<Parameter>, invoke: F) -> Self
    where
        F: Fn(&mut Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.push(parameters, Visibility::NonPublic, invoke)
    }

    fn push<F>(mut self, parameters: Vec<Parameter>, visibility: Visibility, invoke: F) -> Self
    where
        F: Fn(&mut Arguments) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorCandidate {
            parameters,
            visibility,
            invoke: Box::new(invoke),
        });
        self
    }
}

impl<T> TypeDescriptor<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn constructors(&self) -> &[ConstructorCandidate<T>] {
        &self.constructors
    }
}

impl<T: 'static> Default for TypeDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Types the factory knows how to build
pub trait Construct: Sized + 'static {
    fn descriptor() -> TypeDescriptor<Self>;
}
