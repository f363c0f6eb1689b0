//! Stall and genre administration commands.

use booking_store::{Genre, Money, Stall, StallSize};
use serde::Deserialize;

use crate::{AllocationError, Result};

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AllocationError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_price(price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(AllocationError::Validation(
            "price must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Command to add a stall to the floor plan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStall {
    pub code: String,
    pub size: StallSize,
    pub price: Money,
    pub location: String,
    pub dimensions: String,
}

impl CreateStall {
    /// Creates a new CreateStall command.
    pub fn new(
        code: impl Into<String>,
        size: StallSize,
        price: Money,
        location: impl Into<String>,
        dimensions: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            size,
            price,
            location: location.into(),
            dimensions: dimensions.into(),
        }
    }

    /// Checks field constraints.
    pub fn validate(&self) -> Result<()> {
        require_text("code", &self.code)?;
        require_text("location", &self.location)?;
        require_text("dimensions", &self.dimensions)?;
        require_price(self.price)
    }

    /// Builds the stall record. Codes are stored trimmed.
    pub fn into_stall(self) -> Stall {
        Stall::new(
            self.code.trim(),
            self.size,
            self.price,
            self.location,
            self.dimensions,
        )
    }
}

/// Command to edit a stall. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStall {
    pub code: Option<String>,
    pub size: Option<StallSize>,
    pub price: Option<Money>,
    pub location: Option<String>,
    pub dimensions: Option<String>,

    /// Puts the stall under maintenance (`true`) or returns it to service.
    pub maintenance: Option<bool>,
}

impl UpdateStall {
    /// Creates an empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the new code.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the new size.
    pub fn size(mut self, size: StallSize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the new price.
    pub fn price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the new location.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the new dimensions.
    pub fn dimensions(mut self, dimensions: impl Into<String>) -> Self {
        self.dimensions = Some(dimensions.into());
        self
    }

    /// Requests a maintenance toggle.
    pub fn maintenance(mut self, on: bool) -> Self {
        self.maintenance = Some(on);
        self
    }

    /// Returns true if any descriptive field is set.
    pub fn edits_fields(&self) -> bool {
        self.code.is_some()
            || self.size.is_some()
            || self.price.is_some()
            || self.location.is_some()
            || self.dimensions.is_some()
    }

    /// Checks constraints on the fields that are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(code) = &self.code {
            require_text("code", code)?;
        }
        if let Some(location) = &self.location {
            require_text("location", location)?;
        }
        if let Some(dimensions) = &self.dimensions {
            require_text("dimensions", dimensions)?;
        }
        if let Some(price) = self.price {
            require_price(price)?;
        }
        Ok(())
    }

    /// Returns a copy of `stall` with the descriptive edits applied.
    pub fn apply(&self, stall: &Stall) -> Stall {
        let mut edited = stall.clone();
        if let Some(code) = &self.code {
            edited.code = code.trim().to_string();
        }
        if let Some(size) = self.size {
            edited.size = size;
        }
        if let Some(price) = self.price {
            edited.price = price;
        }
        if let Some(location) = &self.location {
            edited.location = location.clone();
        }
        if let Some(dimensions) = &self.dimensions {
            edited.dimensions = dimensions.clone();
        }
        edited
    }
}

/// Command to add a genre.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGenre {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateGenre {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)
    }

    /// Builds the genre record. Names are stored trimmed.
    pub fn into_genre(self) -> Genre {
        Genre::new(self.name.trim(), self.description)
    }
}

/// Command to edit a genre. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGenre {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl UpdateGenre {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.name {
            Some(name) => require_text("name", name),
            None => Ok(()),
        }
    }

    /// Returns `genre` with the given fields replaced.
    pub fn apply(&self, genre: &Genre) -> Genre {
        let mut edited = genre.clone();
        if let Some(name) = &self.name {
            edited.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            edited.description = Some(description.clone());
        }
        edited
    }
}
