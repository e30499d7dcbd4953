//! Compilation target description.

/// Operating system the output object file targets.
///
/// The only behavior keyed off this in the shared-generics core is object
/// section placement for emitted dictionaries.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TargetOs {
    Windows,
    Linux,
    MacOs,
}

/// Target machine facts the shared-generics core depends on.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TargetDetails {
    /// Size in bytes of a pointer, and therefore of one dictionary slot.
    pub pointer_size: u32,
    pub os: TargetOs,
}

impl TargetDetails {
    /// 64-bit Linux target, the default for tests.
    pub const LP64: TargetDetails = TargetDetails {
        pointer_size: 8,
        os: TargetOs::Linux,
    };

    /// 64-bit Windows target.
    pub const WIN64: TargetDetails = TargetDetails {
        pointer_size: 8,
        os: TargetOs::Windows,
    };
}

impl Default for TargetDetails {
    fn default() -> Self {
        Self::LP64
    }
}
