//! Application view
//!
//! The snapshot of the whole program visible to one pass: a program
//! partition (mutable) and a library partition (immutable), both keyed on
//! interned [`Type`] handles. A class is in exactly one partition.
//! Between passes the driver rebuilds the view through the current lens;
//! within a pass the view is shared read-only across workers.

use crate::class::{ClassDefinition, FieldDefinition, MethodDefinition};
use crate::pool::{SymbolPool, Type};
use crate::reference::{FieldReference, MethodReference};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// View construction and mutation errors
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The same type was defined twice in one partition
    #[error("duplicate definition of {0}")]
    DuplicateDefinition(String),

    /// A type was defined in both the program and the library
    #[error("type {0} defined as both program and library")]
    ProgramLibraryOverlap(String),
}

/// Whole-program snapshot
#[derive(Debug, Clone)]
pub struct ApplicationView {
    pool: Arc<SymbolPool>,
    program: IndexMap<Type, ClassDefinition>,
    library: IndexMap<Type, ClassDefinition>,
}

impl ApplicationView {
    /// Empty view over a symbol pool
    #[must_use]
    pub fn new(pool: Arc<SymbolPool>) -> Self {
        Self {
            pool,
            program: IndexMap::new(),
            library: IndexMap::new(),
        }
    }

    /// The shared symbol pool
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &SymbolPool {
        &self.pool
    }

    /// Shared handle to the symbol pool
    #[inline]
    #[must_use]
    pub fn pool_arc(&self) -> Arc<SymbolPool> {
        Arc::clone(&self.pool)
    }

    /// Add a program class
    ///
    /// # Errors
    /// Rejects duplicates and program/library overlap.
    pub fn add_program_class(&mut self, class: ClassDefinition) -> Result<(), ViewError> {
        let ty = class.ty;
        if self.library.contains_key(&ty) {
            return Err(ViewError::ProgramLibraryOverlap(
                self.pool.type_descriptor(ty).to_string(),
            ));
        }
        if self.program.insert(ty, class).is_some() {
            return Err(ViewError::DuplicateDefinition(
                self.pool.type_descriptor(ty).to_string(),
            ));
        }
        Ok(())
    }

    /// Add a library class
    ///
    /// # Errors
    /// Rejects duplicates and program/library overlap.
    pub fn add_library_class(&mut self, class: ClassDefinition) -> Result<(), ViewError> {
        let ty = class.ty;
        if self.program.contains_key(&ty) {
            return Err(ViewError::ProgramLibraryOverlap(
                self.pool.type_descriptor(ty).to_string(),
            ));
        }
        if self.library.insert(ty, class).is_some() {
            return Err(ViewError::DuplicateDefinition(
                self.pool.type_descriptor(ty).to_string(),
            ));
        }
        Ok(())
    }

    /// Definition for a type, program or library
    #[must_use]
    pub fn definition(&self, ty: Type) -> Option<&ClassDefinition> {
        self.program.get(&ty).or_else(|| self.library.get(&ty))
    }

    /// Program class by type
    #[inline]
    #[must_use]
    pub fn program_class(&self, ty: Type) -> Option<&ClassDefinition> {
        self.program.get(&ty)
    }

    /// Mutable program class by type
    #[inline]
    pub fn program_class_mut(&mut self, ty: Type) -> Option<&mut ClassDefinition> {
        self.program.get_mut(&ty)
    }

    /// Whether a type is a program class
    #[inline]
    #[must_use]
    pub fn is_program(&self, ty: Type) -> bool {
        self.program.contains_key(&ty)
    }

    /// Whether a type is a library class
    #[inline]
    #[must_use]
    pub fn is_library(&self, ty: Type) -> bool {
        self.library.contains_key(&ty)
    }

    /// Program classes in insertion order
    pub fn program_classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.program.values()
    }

    /// Mutable program classes
    pub fn program_classes_mut(&mut self) -> impl Iterator<Item = &mut ClassDefinition> {
        self.program.values_mut()
    }

    /// Library classes in insertion order
    pub fn library_classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.library.values()
    }

    /// Program types sorted by descriptor, the deterministic iteration
    /// order used by every pass
    #[must_use]
    pub fn sorted_program_types(&self) -> Vec<Type> {
        let mut types: Vec<Type> = self.program.keys().copied().collect();
        types.sort_by(|a, b| self.pool.compare_types(*a, *b));
        types
    }

    /// Number of program classes
    #[inline]
    #[must_use]
    pub fn program_class_count(&self) -> usize {
        self.program.len()
    }

    /// Remove a program class, returning it
    pub fn remove_program_class(&mut self, ty: Type) -> Option<ClassDefinition> {
        self.program.shift_remove(&ty)
    }

    /// Re-key both partitions after definitions changed their own types
    ///
    /// Passes that rewrite `ClassDefinition::ty` in place call this so
    /// the partition keys match the definitions again.
    pub fn reindex(&mut self) {
        let program = std::mem::take(&mut self.program);
        self.program = program.into_values().map(|c| (c.ty, c)).collect();
        let library = std::mem::take(&mut self.library);
        self.library = library.into_values().map(|c| (c.ty, c)).collect();
    }

    /// Resolve a method reference to its definition, walking up the
    /// superclass chain from the holder
    #[must_use]
    pub fn resolve_method(&self, reference: &MethodReference) -> Option<&MethodDefinition> {
        let mut holder = Some(reference.holder);
        while let Some(ty) = holder {
            let class = self.definition(ty)?;
            if let Some(method) = class.method(&reference.signature) {
                return Some(method);
            }
            holder = class.superclass;
        }
        None
    }

    /// Resolve a field reference to its definition, walking up the
    /// superclass chain from the holder
    #[must_use]
    pub fn resolve_field(&self, reference: FieldReference) -> Option<&FieldDefinition> {
        let mut holder = Some(reference.holder);
        while let Some(ty) = holder {
            let class = self.definition(ty)?;
            if let Some(field) = class.field(reference.name, reference.ty) {
                return Some(field);
            }
            holder = class.superclass;
        }
        None
    }

    /// Every interface a type transitively conforms to: directly
    /// implemented interfaces, interfaces extended by those, and
    /// interfaces inherited through the superclass chain
    ///
    /// The upward counterpart to [`ClassHierarchy`]'s subtype edges;
    /// virtual-dispatch liveness and rename safety both walk this in
    /// addition to superclasses.
    #[must_use]
    pub fn transitive_interfaces(&self, ty: Type) -> Vec<Type> {
        let mut visited: HashSet<Type> = HashSet::new();
        let mut interfaces: Vec<Type> = Vec::new();
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(class) = self.definition(current) else { continue };
            for interface in &class.interfaces {
                if !interfaces.contains(interface) {
                    interfaces.push(*interface);
                }
                stack.push(*interface);
            }
            if let Some(superclass) = class.superclass {
                stack.push(superclass);
            }
        }
        interfaces
    }
}

/// Subtype index derived from one view snapshot
///
/// Built on demand by passes that need downward traversal; invalidated
/// simply by rebuilding after the next lens-producing pass.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    children: HashMap<Type, Vec<Type>>,
}

impl ClassHierarchy {
    /// Build the subtype index for a view
    #[must_use]
    pub fn build(view: &ApplicationView) -> Self {
        let mut children: HashMap<Type, Vec<Type>> = HashMap::new();
        for class in view.program_classes().chain(view.library_classes()) {
            if let Some(superclass) = class.superclass {
                children.entry(superclass).or_default().push(class.ty);
            }
            for interface in &class.interfaces {
                children.entry(*interface).or_default().push(class.ty);
            }
        }
        for subtypes in children.values_mut() {
            subtypes.sort_by(|a, b| view.pool().compare_types(*a, *b));
        }
        Self { children }
    }

    /// Direct subtypes of a type
    #[must_use]
    pub fn direct_subtypes(&self, ty: Type) -> &[Type] {
        self.children.get(&ty).map_or(&[], Vec::as_slice)
    }
}
