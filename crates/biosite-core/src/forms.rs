//! # Forms
//!
//! Request bodies accepted by the API, and their validation.
//!
//! Every form implements [`Form::validate`], which consumes the raw input
//! and returns a normalized copy (trimmed strings, lowercased emails,
//! blank optionals collapsed to `None`) or every field failure at once.
//!
//! ## Patch Semantics
//!
//! `*Patch` forms update a row in place. For an optional column the field
//! is an `Option<Option<T>>`:
//! - absent from the JSON body: column unchanged
//! - `null`: column cleared
//! - a value: column set

use crate::primitives::{
    MAX_CAPTION_LENGTH, MAX_LONG_TEXT_LENGTH, MAX_SHORT_TEXT_LENGTH, MAX_URL_LENGTH,
};
use crate::validation::{ValidationErrors, Validator};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A request body that can be validated and normalized.
pub trait Form: Sized {
    fn validate(self) -> Result<Self, ValidationErrors>;
}

/// Distinguish an explicit `null` from an absent field.
fn explicit<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Borrow the inner string of a patch field.
fn patch_str(value: &Option<Option<String>>) -> Option<Option<&str>> {
    value.as_ref().map(|inner| inner.as_deref())
}

// =============================================================================
// VISITORS
// =============================================================================

/// Subscribe / create a visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVisitor {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Form for NewVisitor {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let email = v.email("email", &self.email, MAX_SHORT_TEXT_LENGTH);
        let name = v.optional("name", self.name.as_deref(), MAX_SHORT_TEXT_LENGTH);
        v.finish()?;
        Ok(Self { email, name })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscribed_at: Option<Option<DateTime<Utc>>>,
}

impl Form for VisitorPatch {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let email = self
            .email
            .as_deref()
            .map(|email| v.email("email", email, MAX_SHORT_TEXT_LENGTH));
        let name = v.optional_patch("name", patch_str(&self.name), MAX_SHORT_TEXT_LENGTH);
        v.finish()?;
        Ok(Self {
            email,
            name,
            subscribed_at: self.subscribed_at,
        })
    }
}

impl From<NewVisitor> for VisitorPatch {
    fn from(form: NewVisitor) -> Self {
        Self {
            email: Some(form.email),
            name: Some(form.name),
            subscribed_at: None,
        }
    }
}

// =============================================================================
// ACHIEVEMENTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAchievement {
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Form for NewAchievement {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let title = v.required("title", &self.title, MAX_SHORT_TEXT_LENGTH);
        let year = v.year("year", self.year);
        let description = v.optional(
            "description",
            self.description.as_deref(),
            MAX_LONG_TEXT_LENGTH,
        );
        let category = v.optional("category", self.category.as_deref(), MAX_SHORT_TEXT_LENGTH);
        v.finish()?;
        Ok(Self {
            title,
            year,
            description,
            category,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<Option<i32>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Option<String>>,
}

impl Form for AchievementPatch {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let title = self
            .title
            .as_deref()
            .map(|title| v.required("title", title, MAX_SHORT_TEXT_LENGTH));
        let year = self.year.map(|year| v.year("year", year));
        let description = v.optional_patch(
            "description",
            patch_str(&self.description),
            MAX_LONG_TEXT_LENGTH,
        );
        let category = v.optional_patch(
            "category",
            patch_str(&self.category),
            MAX_SHORT_TEXT_LENGTH,
        );
        v.finish()?;
        Ok(Self {
            title,
            year,
            description,
            category,
        })
    }
}

impl From<NewAchievement> for AchievementPatch {
    fn from(form: NewAchievement) -> Self {
        Self {
            title: Some(form.title),
            year: Some(form.year),
            description: Some(form.description),
            category: Some(form.category),
        }
    }
}

// =============================================================================
// GALLERY
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGalleryItem {
    pub image_url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl Form for NewGalleryItem {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let image_url = v.url("image_url", &self.image_url, MAX_URL_LENGTH);
        let caption = v.optional("caption", self.caption.as_deref(), MAX_CAPTION_LENGTH);
        let year = v.year("year", self.year);
        v.finish()?;
        Ok(Self {
            image_url,
            caption,
            year,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub caption: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<Option<i32>>,
}

impl Form for GalleryItemPatch {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let image_url = self
            .image_url
            .as_deref()
            .map(|url| v.url("image_url", url, MAX_URL_LENGTH));
        let caption = v.optional_patch("caption", patch_str(&self.caption), MAX_CAPTION_LENGTH);
        let year = self.year.map(|year| v.year("year", year));
        v.finish()?;
        Ok(Self {
            image_url,
            caption,
            year,
        })
    }
}

impl From<NewGalleryItem> for GalleryItemPatch {
    fn from(form: NewGalleryItem) -> Self {
        Self {
            image_url: Some(form.image_url),
            caption: Some(form.caption),
            year: Some(form.year),
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl Form for NewEvent {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let title = v.required("title", &self.title, MAX_SHORT_TEXT_LENGTH);
        let description = v.optional(
            "description",
            self.description.as_deref(),
            MAX_LONG_TEXT_LENGTH,
        );
        let location = v.optional("location", self.location.as_deref(), MAX_SHORT_TEXT_LENGTH);
        let media_url = v.optional_url("media_url", self.media_url.as_deref(), MAX_URL_LENGTH);
        v.finish()?;
        Ok(Self {
            title,
            description,
            location,
            event_date: self.event_date,
            media_url,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        deserialize_with = "explicit",
        skip_serializing_if = "Option::is_none"
    )]
    pub media_url: Option<Option<String>>,
}

impl Form for EventPatch {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let title = self
            .title
            .as_deref()
            .map(|title| v.required("title", title, MAX_SHORT_TEXT_LENGTH));
        let description = v.optional_patch(
            "description",
            patch_str(&self.description),
            MAX_LONG_TEXT_LENGTH,
        );
        let location = v.optional_patch(
            "location",
            patch_str(&self.location),
            MAX_SHORT_TEXT_LENGTH,
        );
        let media_url = patch_str(&self.media_url)
            .map(|url| v.optional_url("media_url", url, MAX_URL_LENGTH));
        v.finish()?;
        Ok(Self {
            title,
            description,
            location,
            event_date: self.event_date,
            media_url,
        })
    }
}

impl From<NewEvent> for EventPatch {
    fn from(form: NewEvent) -> Self {
        Self {
            title: Some(form.title),
            description: Some(form.description),
            location: Some(form.location),
            event_date: Some(form.event_date),
            media_url: Some(form.media_url),
        }
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// The public contact form: identifies the visitor by email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
}

impl Form for ContactForm {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let email = v.email("email", &self.email, MAX_SHORT_TEXT_LENGTH);
        let name = v.optional("name", self.name.as_deref(), MAX_SHORT_TEXT_LENGTH);
        let subject = v.optional("subject", self.subject.as_deref(), MAX_SHORT_TEXT_LENGTH);
        let content = v.required("content", &self.content, MAX_LONG_TEXT_LENGTH);
        v.finish()?;
        Ok(Self {
            email,
            name,
            subject,
            content,
        })
    }
}

// =============================================================================
// ACCOUNTS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Form for RegisterForm {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let email = v.email("email", &self.email, MAX_SHORT_TEXT_LENGTH);
        v.password("password", &self.password);
        let name = v.optional("name", self.name.as_deref(), MAX_SHORT_TEXT_LENGTH);
        v.finish()?;
        Ok(Self {
            email,
            password: self.password,
            name,
        })
    }
}

/// Login only normalizes the email; the password is checked against the
/// stored digest, never against the registration rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl Form for LoginForm {
    fn validate(self) -> Result<Self, ValidationErrors> {
        let mut v = Validator::new();
        let email = v.required("email", &self.email, MAX_SHORT_TEXT_LENGTH);
        if self.password.is_empty() {
            v.reject("password", "is required");
        }
        v.finish()?;
        Ok(Self {
            email: email.to_lowercase(),
            password: self.password,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let absent: AchievementPatch = serde_json::from_str(r#"{"title":"New"}"#).expect("parse");
        assert_eq!(absent.title.as_deref(), Some("New"));
        assert_eq!(absent.category, None);

        let cleared: AchievementPatch =
            serde_json::from_str(r#"{"category":null,"year":1999}"#).expect("parse");
        assert_eq!(cleared.category, Some(None));
        assert_eq!(cleared.year, Some(Some(1999)));
        assert_eq!(cleared.title, None);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = GalleryItemPatch {
            caption: Some(None),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&patch).expect("serialize"),
            r#"{"caption":null}"#
        );
    }

    #[test]
    fn new_achievement_is_normalized() {
        let form = NewAchievement {
            title: "  Turing Award ".into(),
            year: Some(2001),
            description: Some("   ".into()),
            category: Some(" Science".into()),
        }
        .validate()
        .expect("valid");
        assert_eq!(form.title, "Turing Award");
        assert_eq!(form.description, None);
        assert_eq!(form.category.as_deref(), Some("Science"));
    }

    #[test]
    fn new_achievement_rejects_bad_year_and_blank_title() {
        let errors = NewAchievement {
            title: " ".into(),
            year: Some(99),
            ..Default::default()
        }
        .validate()
        .expect_err("invalid");
        assert!(errors.field("title").is_some());
        assert!(errors.field("year").is_some());
    }

    #[test]
    fn gallery_requires_a_usable_url() {
        let errors = NewGalleryItem {
            image_url: "portrait.jpg".into(),
            ..Default::default()
        }
        .validate()
        .expect_err("relative path");
        assert!(errors.field("image_url").is_some());

        assert!(
            NewGalleryItem {
                image_url: "/media/portrait.jpg".into(),
                ..Default::default()
            }
            .validate()
            .is_ok()
        );
    }

    #[test]
    fn patch_title_cannot_be_blanked() {
        let errors = EventPatch {
            title: Some("  ".into()),
            ..Default::default()
        }
        .validate()
        .expect_err("blank title");
        assert!(errors.field("title").is_some());
    }

    #[test]
    fn contact_form_lowercases_email() {
        let form = ContactForm {
            email: "Grace@Navy.MIL".into(),
            name: None,
            subject: None,
            content: "Hello".into(),
        }
        .validate()
        .expect("valid");
        assert_eq!(form.email, "grace@navy.mil");
    }

    #[test]
    fn replace_converts_to_full_patch() {
        let patch = AchievementPatch::from(NewAchievement {
            title: "Medal".into(),
            ..Default::default()
        });
        assert_eq!(patch.year, Some(None));
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.category, Some(None));
    }

    #[test]
    fn register_checks_password_length() {
        let errors = RegisterForm {
            email: "ada@example.com".into(),
            password: "short".into(),
            name: None,
        }
        .validate()
        .expect_err("short password");
        assert!(errors.field("password").is_some());
        assert!(errors.field("email").is_none());
    }
}
