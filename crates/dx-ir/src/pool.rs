//! Symbol pool - interned types and member names
//!
//! Provides [`SymbolPool`], the content-addressed pool behind every
//! [`Type`] and [`Name`] handle in the program. Handle equality is
//! identity; two handles compare equal iff they intern the same text.
//!
//! The pool is shared across worker threads: forward lookups go through
//! per-bucket locked maps and are lock-free once warmed, reverse lookups
//! read an append-only table behind a read-write lock.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Interned reference-type handle
///
/// Wraps an index into the owning [`SymbolPool`]'s descriptor table.
/// Carries no state of its own; the Type→definition mapping lives on the
/// application view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type(u32);

impl Type {
    /// Raw table index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Interned member-name handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u32);

impl Name {
    /// Raw table index
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Shared symbol interner
///
/// One pool spans a whole driver run and is passed explicitly to every
/// pass that needs it; there is no process-wide instance.
#[derive(Debug)]
pub struct SymbolPool {
    /// Descriptor text -> type handle
    type_handles: DashMap<Box<str>, Type>,
    /// Type handle index -> descriptor text
    type_table: RwLock<Vec<Arc<str>>>,
    /// Member-name text -> name handle
    name_handles: DashMap<Box<str>, Name>,
    /// Name handle index -> member-name text
    name_table: RwLock<Vec<Arc<str>>>,

    object: Type,
    int: Type,
    void: Type,
    init: Name,
    clinit: Name,
}

/// Descriptor of `java.lang.Object`
pub const OBJECT_DESCRIPTOR: &str = "Ljava/lang/Object;";

/// Descriptor of the primitive `int` type
pub const INT_DESCRIPTOR: &str = "I";

/// Descriptor of `void`
pub const VOID_DESCRIPTOR: &str = "V";

/// Instance-initializer method name
pub const INIT_NAME: &str = "<init>";

/// Class-initializer method name
pub const CLINIT_NAME: &str = "<clinit>";

impl SymbolPool {
    /// Create a pool pre-warmed with the well-known symbols
    #[must_use]
    pub fn new() -> Self {
        let pool = Self {
            type_handles: DashMap::new(),
            type_table: RwLock::new(Vec::new()),
            name_handles: DashMap::new(),
            name_table: RwLock::new(Vec::new()),
            object: Type(0),
            int: Type(0),
            void: Type(0),
            init: Name(0),
            clinit: Name(0),
        };
        let object = pool.intern_type(OBJECT_DESCRIPTOR);
        let int = pool.intern_type(INT_DESCRIPTOR);
        let void = pool.intern_type(VOID_DESCRIPTOR);
        let init = pool.intern_name(INIT_NAME);
        let clinit = pool.intern_name(CLINIT_NAME);
        Self {
            object,
            int,
            void,
            init,
            clinit,
            ..pool
        }
    }

    /// Intern a JVM type descriptor
    ///
    /// Returns the existing handle when the descriptor was seen before.
    pub fn intern_type(&self, descriptor: &str) -> Type {
        if let Some(handle) = self.type_handles.get(descriptor) {
            return *handle;
        }
        let mut table = self.type_table.write();
        // re-check under the write lock so racing interners agree
        if let Some(handle) = self.type_handles.get(descriptor) {
            return *handle;
        }
        let handle = Type(u32::try_from(table.len()).expect("type table overflow"));
        table.push(Arc::from(descriptor));
        self.type_handles.insert(Box::from(descriptor), handle);
        tracing::trace!(descriptor, %handle, "type interned");
        handle
    }

    /// Intern a member name
    pub fn intern_name(&self, name: &str) -> Name {
        if let Some(handle) = self.name_handles.get(name) {
            return *handle;
        }
        let mut table = self.name_table.write();
        if let Some(handle) = self.name_handles.get(name) {
            return *handle;
        }
        let handle = Name(u32::try_from(table.len()).expect("name table overflow"));
        table.push(Arc::from(name));
        self.name_handles.insert(Box::from(name), handle);
        handle
    }

    /// Descriptor text for a type handle
    #[must_use]
    pub fn type_descriptor(&self, ty: Type) -> Arc<str> {
        Arc::clone(&self.type_table.read()[ty.index()])
    }

    /// Text for a name handle
    #[must_use]
    pub fn name_text(&self, name: Name) -> Arc<str> {
        Arc::clone(&self.name_table.read()[name.index()])
    }

    /// `java.lang.Object`
    #[inline]
    #[must_use]
    pub fn object_type(&self) -> Type {
        self.object
    }

    /// Primitive `int`
    #[inline]
    #[must_use]
    pub fn int_type(&self) -> Type {
        self.int
    }

    /// `void`
    #[inline]
    #[must_use]
    pub fn void_type(&self) -> Type {
        self.void
    }

    /// `<init>`
    #[inline]
    #[must_use]
    pub fn init_name(&self) -> Name {
        self.init
    }

    /// `<clinit>`
    #[inline]
    #[must_use]
    pub fn clinit_name(&self) -> Name {
        self.clinit
    }

    /// Whether a type is a primitive (single-letter descriptor)
    #[must_use]
    pub fn is_primitive(&self, ty: Type) -> bool {
        let descriptor = self.type_descriptor(ty);
        matches!(
            descriptor.as_ref(),
            "Z" | "B" | "S" | "C" | "I" | "J" | "F" | "D" | "V"
        )
    }

    /// Whether a type is an array type
    #[must_use]
    pub fn is_array(&self, ty: Type) -> bool {
        self.type_descriptor(ty).starts_with('[')
    }

    /// Whether a type is a class or interface type
    #[must_use]
    pub fn is_reference(&self, ty: Type) -> bool {
        self.type_descriptor(ty).starts_with('L')
    }

    /// Lexicographic descriptor ordering, the fixed tie-break for all
    /// deterministic iteration in the pipeline
    #[must_use]
    pub fn compare_types(&self, a: Type, b: Type) -> std::cmp::Ordering {
        if a == b {
            return std::cmp::Ordering::Equal;
        }
        self.type_descriptor(a)
            .as_ref()
            .cmp(self.type_descriptor(b).as_ref())
    }

    /// Number of interned types
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.type_table.read().len()
    }
}

impl Default for SymbolPool {
    fn default() -> Self {
        Self::new()
    }
}
