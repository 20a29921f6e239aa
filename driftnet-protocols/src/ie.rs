//! ## driftnet-protocols::ie
//! Information Element descriptors.

use std::fmt;

/// Identity of an Information Element. Enterprise `0` is the IANA registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    pub enterprise: u32,
    pub id: u16,
}

impl ElementId {
    pub const fn new(enterprise: u32, id: u16) -> Self {
        Self { enterprise, id }
    }

    pub const fn iana(id: u16) -> Self {
        Self::new(0, id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.enterprise, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Semantics {
    #[default]
    Default,
    Quantity,
    TotalCounter,
    DeltaCounter,
    Identifier,
    Flags,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationElement {
    name: String,
    id: ElementId,
    semantics: Semantics,
    min_length: u16,
    max_length: u16,
    opaque: bool,
}

impl InformationElement {
    pub fn new(
        name: impl Into<String>,
        id: ElementId,
        semantics: Semantics,
        min_length: u16,
        max_length: u16,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            semantics,
            min_length: min_length.min(max_length),
            max_length,
            opaque: false,
        }
    }

    /// Descriptor for an element no decoder is registered for.
    pub fn opaque(id: ElementId) -> Self {
        Self {
            name: format!("unknown({id})"),
            id,
            semantics: Semantics::Default,
            min_length: 0,
            max_length: u16::MAX,
            opaque: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn min_length(&self) -> u16 {
        self.min_length
    }

    pub fn max_length(&self) -> u16 {
        self.max_length
    }

    pub fn is_fixed_width(&self) -> bool {
        self.min_length == self.max_length
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    #[inline]
    pub fn accepts_length(&self, length: usize) -> bool {
        (self.min_length as usize..=self.max_length as usize).contains(&length)
    }
}

impl fmt::Display for InformationElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}
