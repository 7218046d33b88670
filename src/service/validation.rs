//! Request body validation from per-field rules.

use crate::config::ValidationRule;
use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Checks submitted bodies against a model's field rules. Every failure is reported, not just the first.
pub struct RequestValidator<'r> {
    rules: &'r HashMap<String, ValidationRule>,
}

impl<'r> RequestValidator<'r> {
    pub fn new(rules: &'r HashMap<String, ValidationRule>) -> Self {
        RequestValidator { rules }
    }

    /// Full check for create: required fields must be present and non-empty.
    pub fn check_create(&self, body: &Map<String, Value>) -> Result<(), AppError> {
        let mut problems = Vec::new();
        let mut fields: Vec<&String> = self.rules.keys().collect();
        fields.sort();
        for field in fields {
            let rule = &self.rules[field];
            match body.get(field) {
                Some(v) if !is_blank(v) => check_value(field, v, rule, &mut problems),
                _ if rule.required == Some(true) => problems.push(format!("{} is required", field)),
                _ => {}
            }
        }
        finish(problems)
    }

    /// Partial check for update: only submitted fields are validated; a required field may not be cleared.
    pub fn check_update(&self, body: &Map<String, Value>) -> Result<(), AppError> {
        let mut problems = Vec::new();
        for (field, v) in body {
            let Some(rule) = self.rules.get(field) else { continue };
            if is_blank(v) {
                if rule.required == Some(true) {
                    problems.push(format!("{} is required", field));
                }
                continue;
            }
            check_value(field, v, rule, &mut problems);
        }
        finish(problems)
    }
}

fn finish(problems: Vec<String>) -> Result<(), AppError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(problems.join("; ")))
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn check_value(field: &str, v: &Value, rule: &ValidationRule, problems: &mut Vec<String>) {
    if let Some(format) = &rule.format {
        if let Some(p) = format_problem(field, v, format) {
            problems.push(p);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                problems.push(format!("{} must be at most {} characters", field, max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                problems.push(format!("{} must be at least {} characters", field, min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => problems.push(format!("{} does not match the required pattern", field)),
                Ok(_) => {}
                Err(_) => problems.push(format!("{} has an invalid pattern rule", field)),
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| same_value(v, a)) {
            problems.push(format!("{} is not an allowed value", field));
        }
    }
    let number = v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()));
    if let Some(n) = number {
        if let Some(min) = rule.minimum {
            if n < min {
                problems.push(format!("{} must be at least {}", field, min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                problems.push(format!("{} must be at most {}", field, max));
            }
        }
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => *s == n.to_string(),
        _ => a == b,
    }
}

fn format_problem(field: &str, v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    match format.to_ascii_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
                .unwrap_or(false);
            (!valid).then(|| format!("{} must be a valid email", field))
        }
        "uuid" => uuid::Uuid::parse_str(s)
            .is_err()
            .then(|| format!("{} must be a valid UUID", field)),
        _ => None,
    }
}
