//! Domains, function signatures and the fresh-variable supply.
//!
//! This module provides:
//! - Domain metadata (guaranteed objects, finiteness, unknown objects)
//! - Function signatures for random and non-random functions
//! - Canonical constants for the objects of a domain
//! - A per-vocabulary counter for fresh logical variables
//!
//! Every symbolic handle ([`DomainId`], [`FuncId`], [`LogicalVar`],
//! [`Constant`]) is a small `Copy` integer minted by a [`Vocabulary`], so
//! equality and hashing never look at names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

use crate::error::{IrError, Result};
use crate::term::{Arg, Constant, FuncApp, LogicalVar};

/// Handle to a domain registered in a [`Vocabulary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainId(pub u32);

/// Handle to a function registered in a [`Vocabulary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// The builtin Boolean domain, always registered first.
pub const BOOLEAN: DomainId = DomainId(0);

/// Category of a domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    /// Finite set of guaranteed objects, nothing else
    Finite,
    /// `{false, true}`
    Boolean,
    /// No finite enumeration of guaranteed objects
    Infinite,
    /// Guaranteed objects plus objects generated by number statements
    Open,
}

/// Metadata for one domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    /// Domain name (e.g. "Person")
    pub name: String,
    /// Domain category
    pub kind: DomainKind,
    /// Names of the guaranteed objects, in canonical order
    pub objects: Vec<String>,
}

impl DomainInfo {
    /// Create a finite domain from its object names.
    pub fn finite<S: Into<String>>(name: impl Into<String>, objects: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: DomainKind::Finite,
            objects: objects.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a finite domain with objects named `{prefix}0 .. {prefix}{n-1}`.
    pub fn population(name: impl Into<String>, prefix: &str, n: usize) -> Self {
        Self::finite(name, (0..n).map(|i| format!("{}{}", prefix, i)))
    }

    /// Create the Boolean domain.
    pub fn boolean() -> Self {
        Self {
            name: "Boolean".to_string(),
            kind: DomainKind::Boolean,
            objects: vec!["false".to_string(), "true".to_string()],
        }
    }

    /// Create a domain without a finite enumeration.
    pub fn infinite(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DomainKind::Infinite,
            objects: Vec::new(),
        }
    }

    /// Create a domain whose population is partly unknown.
    pub fn open<S: Into<String>>(name: impl Into<String>, guaranteed: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: DomainKind::Open,
            objects: guaranteed.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the guaranteed objects are the whole, finite domain.
    pub fn has_finite_guaranteed(&self) -> bool {
        !matches!(self.kind, DomainKind::Infinite)
    }

    /// Whether objects beyond the guaranteed ones may exist.
    pub fn has_unknown_objects(&self) -> bool {
        matches!(self.kind, DomainKind::Open)
    }

    /// Number of guaranteed objects.
    pub fn size(&self) -> usize {
        self.objects.len()
    }
}

/// Whether a function's values are random variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Random,
    NonRandom,
}

/// Signature of a function symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub arg_domains: Vec<DomainId>,
    pub range: DomainId,
    pub kind: FunctionKind,
    /// Row-major value indices over the argument tuples (non-random only)
    pub interpretation: Option<Vec<u32>>,
}

impl FunctionSignature {
    pub fn arity(&self) -> usize {
        self.arg_domains.len()
    }

    pub fn is_random(&self) -> bool {
        self.kind == FunctionKind::Random
    }
}

/// Registry of domains and functions, and the supply of fresh variables.
#[derive(Debug, Serialize, Deserialize)]
pub struct Vocabulary {
    domains: Vec<DomainInfo>,
    domain_index: IndexMap<String, DomainId>,
    functions: Vec<FunctionSignature>,
    function_index: IndexMap<String, FuncId>,
    next_var: Cell<u32>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary {
    /// Create a vocabulary holding only the Boolean domain.
    pub fn new() -> Self {
        let mut vocab = Vocabulary {
            domains: Vec::new(),
            domain_index: IndexMap::new(),
            functions: Vec::new(),
            function_index: IndexMap::new(),
            next_var: Cell::new(0),
        };
        let boolean = DomainInfo::boolean();
        vocab.domain_index.insert(boolean.name.clone(), BOOLEAN);
        vocab.domains.push(boolean);
        vocab
    }

    /// Register a domain.
    pub fn add_domain(&mut self, info: DomainInfo) -> Result<DomainId> {
        if self.domain_index.contains_key(&info.name) {
            return Err(IrError::DomainAlreadyExists { name: info.name });
        }
        let id = DomainId(self.domains.len() as u32);
        self.domain_index.insert(info.name.clone(), id);
        self.domains.push(info);
        Ok(id)
    }

    pub fn domain(&self, id: DomainId) -> &DomainInfo {
        &self.domains[id.0 as usize]
    }

    pub fn domain_id(&self, name: &str) -> Result<DomainId> {
        self.domain_index
            .get(name)
            .copied()
            .ok_or_else(|| IrError::DomainNotFound {
                name: name.to_string(),
            })
    }

    /// Number of guaranteed objects of a domain.
    pub fn domain_size(&self, id: DomainId) -> usize {
        self.domain(id).size()
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    /// Canonical constant for a named object.
    pub fn constant(&self, domain: DomainId, object: &str) -> Result<Constant> {
        let info = self.domain(domain);
        info.objects
            .iter()
            .position(|o| o == object)
            .map(|i| Constant::new(domain, i as u32))
            .ok_or_else(|| IrError::UnknownObject {
                domain: info.name.clone(),
                object: object.to_string(),
            })
    }

    /// All canonical constants of a domain, in canonical order.
    pub fn constants(&self, domain: DomainId) -> impl Iterator<Item = Constant> + '_ {
        (0..self.domain_size(domain) as u32).map(move |i| Constant::new(domain, i))
    }

    pub fn object_name(&self, c: Constant) -> &str {
        &self.domain(c.domain()).objects[c.index()]
    }

    /// Register a function symbol.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        arg_domains: Vec<DomainId>,
        range: DomainId,
        kind: FunctionKind,
    ) -> Result<FuncId> {
        let name = name.into();
        if self.function_index.contains_key(&name) {
            return Err(IrError::FunctionAlreadyExists { name });
        }
        let id = FuncId(self.functions.len() as u32);
        self.function_index.insert(name.clone(), id);
        self.functions.push(FunctionSignature {
            name,
            arg_domains,
            range,
            kind,
            interpretation: None,
        });
        Ok(id)
    }

    pub fn add_random_function(
        &mut self,
        name: impl Into<String>,
        arg_domains: Vec<DomainId>,
        range: DomainId,
    ) -> Result<FuncId> {
        self.add_function(name, arg_domains, range, FunctionKind::Random)
    }

    /// Register a non-random function together with its value table.
    ///
    /// `table` lists the value index for every argument tuple in row-major
    /// order over the argument domains.
    pub fn add_nonrandom_function(
        &mut self,
        name: impl Into<String>,
        arg_domains: Vec<DomainId>,
        range: DomainId,
        table: Vec<u32>,
    ) -> Result<FuncId> {
        let name = name.into();
        let expected: usize = arg_domains.iter().map(|d| self.domain_size(*d)).product();
        if table.len() != expected {
            return Err(IrError::ArityMismatch {
                name,
                expected,
                actual: table.len(),
            });
        }
        let id = self.add_function(name, arg_domains, range, FunctionKind::NonRandom)?;
        self.functions[id.0 as usize].interpretation = Some(table);
        Ok(id)
    }

    pub fn function(&self, id: FuncId) -> &FunctionSignature {
        &self.functions[id.0 as usize]
    }

    pub fn function_id(&self, name: &str) -> Result<FuncId> {
        self.function_index
            .get(name)
            .copied()
            .ok_or_else(|| IrError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    /// Size of a function's range.
    pub fn range_size(&self, id: FuncId) -> usize {
        self.domain_size(self.function(id).range)
    }

    /// Build a function application, checking arity and argument domains.
    pub fn func_app(&self, func: FuncId, args: Vec<Arg>) -> Result<FuncApp> {
        let sig = self.function(func);
        if sig.arity() != args.len() {
            return Err(IrError::ArityMismatch {
                name: sig.name.clone(),
                expected: sig.arity(),
                actual: args.len(),
            });
        }
        for (i, (arg, expected)) in args.iter().zip(&sig.arg_domains).enumerate() {
            if arg.domain() != *expected {
                return Err(IrError::ArgumentDomainMismatch {
                    name: sig.name.clone(),
                    arg_index: i,
                    expected: self.domain(*expected).name.clone(),
                    actual: self.domain(arg.domain()).name.clone(),
                });
            }
        }
        Ok(FuncApp::new(func, args))
    }

    /// Value of a non-random function on constant arguments.
    pub fn evaluate_nonrandom(&self, func: FuncId, args: &[Constant]) -> Result<Constant> {
        let sig = self.function(func);
        let missing = || IrError::MissingInterpretation {
            name: sig.name.clone(),
        };
        let table = sig.interpretation.as_ref().ok_or_else(missing)?;
        let mut offset = 0usize;
        for (c, d) in args.iter().zip(&sig.arg_domains) {
            offset = offset * self.domain_size(*d) + c.index();
        }
        let value = table.get(offset).copied().ok_or_else(missing)?;
        Ok(Constant::new(sig.range, value))
    }

    /// A logical variable never handed out before.
    pub fn new_var(&self, domain: DomainId) -> LogicalVar {
        let id = self.next_var.get();
        self.next_var.set(id + 1);
        LogicalVar::new(id, domain)
    }

    /// A fresh alpha-variant of `var` (same domain, new identity).
    pub fn fresh_like(&self, var: LogicalVar) -> LogicalVar {
        self.new_var(var.domain())
    }

    /// Human-readable rendering of an argument using object names.
    pub fn render_arg(&self, arg: &Arg) -> String {
        match arg {
            Arg::Var(v) => v.to_string(),
            Arg::Const(c) => self.object_name(*c).to_string(),
        }
    }

    /// Human-readable rendering of a function application.
    pub fn render_func_app(&self, fa: &FuncApp) -> String {
        let args: Vec<String> = fa.args().iter().map(|a| self.render_arg(a)).collect();
        format!("{}({})", self.function(fa.func()).name, args.join(", "))
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}
