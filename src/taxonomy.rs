//! Class ordering and class groups of a classifier.
//!
//! A [`Taxonomy`] fixes which position of a count vector holds which class, and which of
//! those positions count towards the red blood cell population (the parasitemia
//! denominator) and towards the asexual parasites (the numerator). It is an ordinary value
//! handed to the corrector constructors, so several model versions can be used side by side.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::Result;

/// Class ordering of the YOGO classifier.
pub const YOGO_CLASS_ORDERING: [&str; 7] = [
    "healthy",
    "ring",
    "trophozoite",
    "schizont",
    "gametocyte",
    "wbc",
    "misc",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaxonomyDefinition", into = "TaxonomyDefinition")]
pub struct Taxonomy {
    classes: Vec<String>,
    healthy_id: usize,
    rbc_ids: Vec<usize>,
    parasite_ids: Vec<usize>,
}

/// On-disk form of a [`Taxonomy`], naming classes rather than indexing them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaxonomyDefinition {
    pub classes: Vec<String>,
    pub healthy: String,
    pub red_blood_cells: Vec<String>,
    pub asexual_parasites: Vec<String>,
}

impl Taxonomy {
    /// Build a taxonomy from class indices
    ///
    /// # Errors
    /// Fails if a class name is repeated, an index is out of range for `classes`, or either
    /// class group is empty.
    pub fn new(
        classes: Vec<String>,
        healthy_id: usize,
        rbc_ids: Vec<usize>,
        parasite_ids: Vec<usize>,
    ) -> Result<Self> {
        if let Some(duplicate) = classes.iter().duplicates().next() {
            return Err(ConfigurationError::DuplicateClass(duplicate.clone()));
        }
        check_group("red blood cell", &rbc_ids, classes.len())?;
        check_group("asexual parasite", &parasite_ids, classes.len())?;
        check_ids(&[healthy_id], classes.len())?;

        Ok(Self {
            classes,
            healthy_id,
            rbc_ids,
            parasite_ids,
        })
    }

    /// The seven class YOGO taxonomy
    ///
    /// Red blood cells are healthy cells plus the asexual stages (ring, trophozoite,
    /// schizont). Gametocytes, white blood cells and miscellaneous objects are counted by the
    /// classifier but do not enter the parasitemia.
    #[must_use]
    pub fn yogo() -> Self {
        Self {
            classes: YOGO_CLASS_ORDERING.iter().map(ToString::to_string).collect(),
            healthy_id: 0,
            rbc_ids: vec![0, 1, 2, 3],
            parasite_ids: vec![1, 2, 3],
        }
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub const fn healthy_id(&self) -> usize {
        self.healthy_id
    }

    /// Indices of every class counted as a red blood cell
    #[must_use]
    pub fn rbc_ids(&self) -> &[usize] {
        &self.rbc_ids
    }

    /// Indices of the asexual parasite life stages
    #[must_use]
    pub fn parasite_ids(&self) -> &[usize] {
        &self.parasite_ids
    }

    #[must_use]
    pub fn index_of(&self, class: &str) -> Option<usize> {
        self.classes.iter().position(|name| name == class)
    }

    fn resolve(&self, class: &str) -> Result<usize> {
        self.index_of(class)
            .ok_or_else(|| ConfigurationError::UnknownClass(class.to_owned()))
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::yogo()
    }
}

impl TryFrom<TaxonomyDefinition> for Taxonomy {
    type Error = ConfigurationError;

    fn try_from(definition: TaxonomyDefinition) -> Result<Self> {
        // Resolve names against an unchecked ordering first, `new` validates the result
        let lookup = Self {
            classes: definition.classes,
            healthy_id: 0,
            rbc_ids: vec![],
            parasite_ids: vec![],
        };
        let healthy_id = lookup.resolve(&definition.healthy)?;
        let rbc_ids = definition
            .red_blood_cells
            .iter()
            .map(|class| lookup.resolve(class))
            .collect::<Result<Vec<_>>>()?;
        let parasite_ids = definition
            .asexual_parasites
            .iter()
            .map(|class| lookup.resolve(class))
            .collect::<Result<Vec<_>>>()?;

        Self::new(lookup.classes, healthy_id, rbc_ids, parasite_ids)
    }
}

impl From<Taxonomy> for TaxonomyDefinition {
    fn from(taxonomy: Taxonomy) -> Self {
        let name = |id: &usize| taxonomy.classes[*id].clone();
        Self {
            healthy: name(&taxonomy.healthy_id),
            red_blood_cells: taxonomy.rbc_ids.iter().map(name).collect(),
            asexual_parasites: taxonomy.parasite_ids.iter().map(name).collect(),
            classes: taxonomy.classes.clone(),
        }
    }
}

/// Check a class group is non-empty and every member indexes into `num_classes`
pub(crate) fn check_group(name: &'static str, ids: &[usize], num_classes: usize) -> Result<()> {
    if ids.is_empty() {
        return Err(ConfigurationError::EmptyClassGroup(name));
    }
    check_ids(ids, num_classes)
}

fn check_ids(ids: &[usize], num_classes: usize) -> Result<()> {
    match ids.iter().find(|&&id| id >= num_classes) {
        Some(&index) => Err(ConfigurationError::ClassIndexOutOfRange {
            index,
            classes: num_classes,
        }),
        None => Ok(()),
    }
}
