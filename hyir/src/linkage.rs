//! Linkage, visibility, storage class and calling convention of symbols.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// All global variables and functions have one of the following types of linkage.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Linkage {
    /// Visible to other modules; may also be defined in other modules.
    #[default]
    External,

    /// Only directly accessible by objects in the current module. Does not
    /// show up in any symbol table of the object file.
    Private,

    /// Like `Private`, but the value shows as a local symbol (`static` in C).
    Internal,

    /// Merged with other weak definitions of the same name; may be discarded.
    WeakAny,

    /// Weak, with the guarantee that every definition is equivalent.
    WeakOdr,

    /// Like weak, but unreferenced definitions may be discarded.
    LinkOnceAny,

    /// Link-once with the one-definition rule.
    LinkOnceOdr,

    /// Tentative definitions (`int x;` at file scope in C).
    Common,

    /// Arrays concatenated together when modules are linked.
    Appending,

    /// Definition only used for inlining and never emitted.
    AvailableExternally,

    /// A declaration that resolves to null if no definition is found.
    ExternalWeak,
}

impl Linkage {
    pub fn keyword(&self) -> &'static str {
        match self {
            Linkage::External => "external",
            Linkage::Private => "private",
            Linkage::Internal => "internal",
            Linkage::WeakAny => "weak",
            Linkage::WeakOdr => "weak_odr",
            Linkage::LinkOnceAny => "linkonce",
            Linkage::LinkOnceOdr => "linkonce_odr",
            Linkage::Common => "common",
            Linkage::Appending => "appending",
            Linkage::AvailableExternally => "available_externally",
            Linkage::ExternalWeak => "extern_weak",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        Linkage::iter().find(|linkage| linkage.keyword() == s)
    }

    /// `private` or `internal`: invisible outside of the defining module.
    pub fn is_local(&self) -> bool {
        matches!(self, Linkage::Private | Linkage::Internal)
    }

    pub fn is_externally_visible(&self) -> bool {
        !self.is_local()
    }

    /// Only `external` and `extern_weak` are legal on declarations.
    pub fn is_valid_declaration_linkage(&self) -> bool {
        matches!(self, Linkage::External | Linkage::ExternalWeak)
    }

    pub fn is_weak_for_linker(&self) -> bool {
        matches!(
            self,
            Linkage::WeakAny
                | Linkage::WeakOdr
                | Linkage::LinkOnceAny
                | Linkage::LinkOnceOdr
                | Linkage::Common
                | Linkage::ExternalWeak
        )
    }
}

impl std::fmt::Display for Linkage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Symbol visibility.
///
/// Note: a symbol with internal or private linkage must have default visibility.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Visibility {
    /// Visible to other modules and, in shared libraries, may be overridden.
    #[default]
    Default,

    /// Not placed into the dynamic symbol table.
    Hidden,

    /// Placed into the dynamic symbol table but not preemptible.
    Protected,
}

impl Visibility {
    pub fn keyword(&self) -> &'static str {
        match self {
            Visibility::Default => "default",
            Visibility::Hidden => "hidden",
            Visibility::Protected => "protected",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        Visibility::iter().find(|visibility| visibility.keyword() == s)
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// DLL storage class (only meaningful on COFF targets).
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DllStorageClass {
    #[default]
    Default,
    DllImport,
    DllExport,
}

impl DllStorageClass {
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            DllStorageClass::Default => None,
            DllStorageClass::DllImport => Some("dllimport"),
            DllStorageClass::DllExport => Some("dllexport"),
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        DllStorageClass::iter().find(|class| class.keyword() == Some(s))
    }
}

/// Calling convention of a function or call site. The calling convention of
/// any pair of dynamic caller/callee must match.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CallingConvention {
    /// The target C calling convention.
    #[default]
    C,

    /// Pass as much as possible in registers; no varargs.
    FastC,

    /// Optimise the caller under the assumption the call is rarely executed.
    ColdC,

    /// Glasgow Haskell Compiler convention.
    GhcC,

    /// High-Performance Erlang convention.
    HipeC,

    /// Arguments forced into dynamically allocated registers.
    AnyRegC,

    PreserveMostC,
    PreserveAllC,
    PreserveNoneC,
    CxxFastTlsC,

    /// Guaranteed tail calls.
    TailC,

    SwiftC,
    SwiftTailC,
    CfguardCheckC,

    /// Numbered/target-specific calling convention (`cc <n>`).
    Numbered(u32),
}

impl CallingConvention {
    const NAMED: [(CallingConvention, &'static str); 14] = [
        (CallingConvention::C, "ccc"),
        (CallingConvention::FastC, "fastcc"),
        (CallingConvention::ColdC, "coldcc"),
        (CallingConvention::GhcC, "ghccc"),
        (CallingConvention::HipeC, "hipecc"),
        (CallingConvention::AnyRegC, "anyregcc"),
        (CallingConvention::PreserveMostC, "preserve_mostcc"),
        (CallingConvention::PreserveAllC, "preserve_allcc"),
        (CallingConvention::PreserveNoneC, "preserve_nonecc"),
        (CallingConvention::CxxFastTlsC, "cxx_fast_tlscc"),
        (CallingConvention::TailC, "tailcc"),
        (CallingConvention::SwiftC, "swiftcc"),
        (CallingConvention::SwiftTailC, "swifttailcc"),
        (CallingConvention::CfguardCheckC, "cfguard_checkcc"),
    ];

    /// Keyword for named conventions; `None` for [`CallingConvention::Numbered`].
    pub fn keyword(&self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(cconv, _)| cconv == self)
            .map(|(_, keyword)| *keyword)
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, keyword)| *keyword == s)
            .map(|(cconv, _)| *cconv)
    }
}

impl std::fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallingConvention::Numbered(n) => write!(f, "cc {}", n),
            named => f.write_str(named.keyword().unwrap_or("ccc")),
        }
    }
}
