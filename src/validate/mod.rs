//! Client-local input validation.
//!
//! Form input is checked against these constraints before any request
//! is sent; failures are surfaced per field and no network call occurs.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{
    CreateProject, CreateSubtask, CreateTodo, LoginCredentials, RegisterCredentials,
};

lazy_static! {
    /// Regex for validating email addresses
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$"
    ).unwrap();
}

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Builder for collecting multiple validation errors.
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Return Ok(()) if no errors were collected.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors {
                errors: self.errors,
            })
        }
    }
}

fn check_email(builder: &mut ValidationErrorBuilder, email: &str) {
    if !EMAIL_REGEX.is_match(email) {
        builder.add("email", "Invalid email address");
    }
}

pub fn login(credentials: &LoginCredentials) -> Result<(), ValidationErrors> {
    let mut builder = ValidationErrorBuilder::new();
    check_email(&mut builder, &credentials.email);
    if credentials.password.chars().count() < 6 {
        builder.add("password", "Password must be at least 6 characters");
    }
    builder.finish()
}

pub fn register(credentials: &RegisterCredentials) -> Result<(), ValidationErrors> {
    let mut builder = ValidationErrorBuilder::new();
    if credentials.name.trim().chars().count() < 2 {
        builder.add("name", "Name must be at least 2 characters");
    }
    check_email(&mut builder, &credentials.email);
    if credentials.password.chars().count() < 6 {
        builder.add("password", "Password must be at least 6 characters");
    }
    if credentials.password != credentials.confirm_password {
        builder.add("confirmPassword", "Passwords do not match");
    }
    builder.finish()
}

pub fn project(data: &CreateProject) -> Result<(), ValidationErrors> {
    let mut builder = ValidationErrorBuilder::new();
    if data.name.trim().is_empty() {
        builder.add("name", "Project name is required");
    }
    builder.finish()
}

pub fn todo(data: &CreateTodo) -> Result<(), ValidationErrors> {
    let mut builder = ValidationErrorBuilder::new();
    if data.title.trim().is_empty() {
        builder.add("title", "Todo title is required");
    }
    builder.finish()
}

pub fn subtask(data: &CreateSubtask) -> Result<(), ValidationErrors> {
    let mut builder = ValidationErrorBuilder::new();
    if data.title.trim().is_empty() {
        builder.add("title", "Subtask title is required");
    }
    builder.finish()
}
