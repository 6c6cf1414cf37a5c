/// Domain: the schema of a table.
///
/// A domain groups variables into three roles: attributes (features),
/// class variables (targets) and metas (auxiliary columns). Names are unique
/// across all roles. Positional indices run over attributes and then class
/// variables from 0; meta `i` has index `-1 - i`.
///
/// # Examples
///
/// ```
/// use tabular::{Domain, Variable};
///
/// let domain = Domain::new(
///     vec![Variable::continuous("a"), Variable::continuous("b")],
///     vec![Variable::discrete("y", ["no", "yes"]).unwrap()],
///     vec![Variable::string("name")],
/// ).unwrap();
///
/// assert_eq!(domain.len(), 3);
/// assert_eq!(domain.index("y").unwrap(), 2);
/// assert_eq!(domain.index("name").unwrap(), -1);
/// assert_eq!(domain.to_string(), "[a, b | y] {name}");
/// ```

use crate::error::{Result, TableError};
use crate::variable::Variable;
use std::collections::HashMap;
use std::fmt;

/// Reference to a variable: by name, position or the variable itself.
#[derive(Debug, Clone)]
pub enum Key {
    Name(String),
    Index(isize),
    Variable(Variable),
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<isize> for Key {
    fn from(index: isize) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        Key::Index(index as isize)
    }
}

impl From<Variable> for Key {
    fn from(var: Variable) -> Self {
        Key::Variable(var)
    }
}

impl From<&Variable> for Key {
    fn from(var: &Variable) -> Self {
        Key::Variable(var.clone())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{}", name),
            Key::Index(index) => write!(f, "#{}", index),
            Key::Variable(var) => write!(f, "{}", var.name()),
        }
    }
}

/// Role of a variable within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Attribute,
    ClassVar,
    Meta,
}

#[derive(Clone, Default)]
pub struct Domain {
    attributes: Vec<Variable>,
    class_vars: Vec<Variable>,
    metas: Vec<Variable>,
    indices: HashMap<String, isize>,
}

impl Domain {
    /// Build a domain; names must be unique across all three roles.
    pub fn new(attributes: Vec<Variable>, class_vars: Vec<Variable>, metas: Vec<Variable>) -> Result<Self> {
        let mut indices: HashMap<String, isize> = HashMap::new();
        let mut seen: HashMap<&str, &Variable> = HashMap::new();

        let primitives = attributes.iter().chain(class_vars.iter());
        for (var, index) in primitives
            .enumerate()
            .map(|(i, v)| (v, i as isize))
            .chain(metas.iter().enumerate().map(|(i, v)| (v, -1 - i as isize)))
        {
            if let Some(previous) = seen.get(var.name()) {
                let message = if previous.var_type() == var.var_type() {
                    format!("duplicate variable name '{}'", var.name())
                } else {
                    format!(
                        "ambiguous variable name '{}' ({} and {})",
                        var.name(),
                        previous.var_type(),
                        var.var_type()
                    )
                };
                return Err(TableError::Schema(message));
            }
            seen.insert(var.name(), var);
            indices.insert(var.name().to_string(), index);
        }

        Ok(Domain {
            attributes,
            class_vars,
            metas,
            indices,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &[Variable] {
        &self.attributes
    }

    pub fn class_vars(&self) -> &[Variable] {
        &self.class_vars
    }

    pub fn metas(&self) -> &[Variable] {
        &self.metas
    }

    /// The single class variable; `None` without class variables.
    pub fn class_var(&self) -> Result<Option<&Variable>> {
        match self.class_vars.len() {
            0 => Ok(None),
            1 => Ok(self.class_vars.first()),
            n => Err(TableError::Schema(format!(
                "domain has {} class variables; class_var needs exactly one",
                n
            ))),
        }
    }

    /// Attributes followed by class variables.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.attributes.iter().chain(self.class_vars.iter())
    }

    /// Every variable, metas included.
    pub fn all_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables().chain(self.metas.iter())
    }

    /// Number of attributes and class variables.
    pub fn len(&self) -> usize {
        self.attributes.len() + self.class_vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.metas.is_empty()
    }

    pub fn has_discrete_attributes(&self) -> bool {
        self.attributes.iter().any(Variable::is_discrete)
    }

    pub fn has_continuous_attributes(&self) -> bool {
        self.attributes.iter().any(Variable::is_continuous)
    }

    pub fn has_time_class(&self) -> bool {
        self.class_vars.iter().any(Variable::is_time)
    }

    /// Positional index of a variable.
    pub fn index(&self, key: impl Into<Key>) -> Result<isize> {
        match key.into() {
            Key::Name(name) => self
                .indices
                .get(&name)
                .copied()
                .ok_or(TableError::UnknownVariable(name)),
            Key::Index(index) => {
                self.at(index)?;
                Ok(index)
            }
            Key::Variable(var) => match self.indices.get(var.name()) {
                Some(&index) if self.at(index).map_or(false, |v| v == &var) => Ok(index),
                _ => Err(TableError::UnknownVariable(var.name().to_string())),
            },
        }
    }

    fn at(&self, index: isize) -> Result<&Variable> {
        let found = if index >= 0 {
            let i = index as usize;
            if i < self.attributes.len() {
                self.attributes.get(i)
            } else {
                self.class_vars.get(i - self.attributes.len())
            }
        } else {
            self.metas.get((-1 - index) as usize)
        };
        found.ok_or(TableError::IndexOutOfRange(index))
    }

    /// Look up a variable by name, position or identity.
    pub fn get(&self, key: impl Into<Key>) -> Result<&Variable> {
        let index = self.index(key)?;
        self.at(index)
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.index(key).is_ok()
    }

    pub fn role_of(&self, index: isize) -> Result<Role> {
        self.at(index)?;
        Ok(if index < 0 {
            Role::Meta
        } else if (index as usize) < self.attributes.len() {
            Role::Attribute
        } else {
            Role::ClassVar
        })
    }

    /// A domain holding the selected variables, each in its original role,
    /// in the order given.
    pub fn select<K: Into<Key> + Clone>(&self, keys: &[K]) -> Result<Domain> {
        let mut attributes = Vec::new();
        let mut class_vars = Vec::new();
        let mut metas = Vec::new();
        for key in keys {
            let index = self.index(key.clone())?;
            let var = self.at(index)?.clone();
            match self.role_of(index)? {
                Role::Attribute => attributes.push(var),
                Role::ClassVar => class_vars.push(var),
                Role::Meta => metas.push(var),
            }
        }
        Domain::new(attributes, class_vars, metas)
    }

    /// Union with `other`; per role, variables already present are skipped.
    pub fn merge(&self, other: &Domain) -> Result<Domain> {
        Domain::merge_all(&[self, other])
    }

    pub fn merge_all(domains: &[&Domain]) -> Result<Domain> {
        fn union<'a>(parts: impl Iterator<Item = &'a [Variable]>) -> Vec<Variable> {
            let mut out: Vec<Variable> = Vec::new();
            for var in parts.flatten() {
                if !out.contains(var) {
                    out.push(var.clone());
                }
            }
            out
        }
        Domain::new(
            union(domains.iter().map(|d| d.attributes())),
            union(domains.iter().map(|d| d.class_vars())),
            union(domains.iter().map(|d| d.metas())),
        )
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes && self.class_vars == other.class_vars && self.metas == other.metas
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |vars: &[Variable]| vars.iter().map(|v| v.name().to_string()).collect::<Vec<_>>().join(", ");
        write!(f, "[{}", names(&self.attributes))?;
        if !self.class_vars.is_empty() {
            write!(f, " | {}", names(&self.class_vars))?;
        }
        write!(f, "]")?;
        if !self.metas.is_empty() {
            write!(f, " {{{}}}", names(&self.metas))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain({:?}, {:?}, {:?})", self.attributes, self.class_vars, self.metas)
    }
}
