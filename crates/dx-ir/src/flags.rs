//! JVM access flags

use std::fmt::{self, Display, Formatter};

/// Access-flag bitset for classes, fields, and methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(u32);

impl AccessFlags {
    /// `public`
    pub const PUBLIC: u32 = 0x0001;
    /// `private`
    pub const PRIVATE: u32 = 0x0002;
    /// `protected`
    pub const PROTECTED: u32 = 0x0004;
    /// `static`
    pub const STATIC: u32 = 0x0008;
    /// `final`
    pub const FINAL: u32 = 0x0010;
    /// Interface class
    pub const INTERFACE: u32 = 0x0200;
    /// `abstract`
    pub const ABSTRACT: u32 = 0x0400;
    /// Compiler-synthesized member or class
    pub const SYNTHETIC: u32 = 0x1000;
    /// Enum class or enum constant field
    pub const ENUM: u32 = 0x4000;

    /// Empty (package-private) flag set
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// From raw bits
    #[inline]
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    #[inline]
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// With an additional flag set
    #[inline]
    #[must_use]
    pub fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }

    /// With a flag cleared
    #[inline]
    #[must_use]
    pub fn without(self, flag: u32) -> Self {
        Self(self.0 & !flag)
    }

    /// Whether a flag is set
    #[inline]
    #[must_use]
    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// `public`
    #[inline]
    #[must_use]
    pub fn is_public(self) -> bool {
        self.has(Self::PUBLIC)
    }

    /// `private`
    #[inline]
    #[must_use]
    pub fn is_private(self) -> bool {
        self.has(Self::PRIVATE)
    }

    /// `static`
    #[inline]
    #[must_use]
    pub fn is_static(self) -> bool {
        self.has(Self::STATIC)
    }

    /// `final`
    #[inline]
    #[must_use]
    pub fn is_final(self) -> bool {
        self.has(Self::FINAL)
    }

    /// `abstract`
    #[inline]
    #[must_use]
    pub fn is_abstract(self) -> bool {
        self.has(Self::ABSTRACT)
    }

    /// Interface class
    #[inline]
    #[must_use]
    pub fn is_interface(self) -> bool {
        self.has(Self::INTERFACE)
    }

    /// Synthetic
    #[inline]
    #[must_use]
    pub fn is_synthetic(self) -> bool {
        self.has(Self::SYNTHETIC)
    }

    /// Enum class or enum constant
    #[inline]
    #[must_use]
    pub fn is_enum(self) -> bool {
        self.has(Self::ENUM)
    }

    /// Coarse visibility bucket, used when grouping classes by
    /// access-modifier equivalence: 0 = public, 1 = protected,
    /// 2 = package-private, 3 = private
    #[must_use]
    pub fn visibility_rank(self) -> u8 {
        if self.is_public() {
            0
        } else if self.has(Self::PROTECTED) {
            1
        } else if self.is_private() {
            3
        } else {
            2
        }
    }
}

impl Display for AccessFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_and_without() {
        let flags = AccessFlags::empty()
            .with(AccessFlags::PUBLIC)
            .with(AccessFlags::FINAL);

        assert!(flags.is_public());
        assert!(flags.is_final());
        assert!(!flags.is_static());
        assert!(!flags.without(AccessFlags::FINAL).is_final());
    }

    #[test]
    fn visibility_rank_ordering() {
        let public = AccessFlags::empty().with(AccessFlags::PUBLIC);
        let protected = AccessFlags::empty().with(AccessFlags::PROTECTED);
        let package = AccessFlags::empty();
        let private = AccessFlags::empty().with(AccessFlags::PRIVATE);

        assert_eq!(public.visibility_rank(), 0);
        assert_eq!(protected.visibility_rank(), 1);
        assert_eq!(package.visibility_rank(), 2);
        assert_eq!(private.visibility_rank(), 3);
    }
}
