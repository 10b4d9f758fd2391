//! Request validation.
//!
//! Each RPC input is mirrored by a struct deriving `validator::Validate`.
//! Failures are flattened into a `{field → message}` map carried inside
//! `ServiceError::Validation`, with messages phrased for form rendering.

use std::collections::BTreeMap;

use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::domain::{IntersectionType, OptimisationType, TrafficDensity};
use crate::errors::{Result, ServiceError};

/// Validate an input struct, flattening nested errors into field paths like
/// `details.address` or `default_parameters.parameters.green`.
pub fn validate<T: Validate>(input: &T) -> Result<()> {
    match input.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let mut fields = BTreeMap::new();
            collect_errors("", &errors, &mut fields);
            Err(ServiceError::validation_fields("invalid request", fields))
        }
    }
}

fn collect_errors(prefix: &str, errors: &ValidationErrors, out: &mut BTreeMap<String, String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                if let Some(error) = field_errors.first() {
                    out.insert(path.clone(), field_message(&path, error));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_errors(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_errors(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

fn field_message(field: &str, error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    match error.code.as_ref() {
        "required" => format!("{field} is required"),
        "email" => "Invalid email format".to_string(),
        "uuid" => format!("{field} must be a valid UUID"),
        _ => format!("{field} is invalid"),
    }
}

fn uuid_format(value: &str) -> std::result::Result<(), ValidationError> {
    if Uuid::parse_str(value).is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("uuid"))
    }
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct RegisterUserInput {
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters long"))]
    pub name: String,
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "email must be at most 255 characters long")
    )]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters long"))]
    pub password: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct LoginUserInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, code = "required"))]
    pub password: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct UserIdInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub user_id: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct EmailInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct PageInput {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: i32,
    #[validate(range(min = 1, max = 100, message = "page_size must be between 1 and 100"))]
    pub page_size: i32,
    #[validate(length(max = 255, message = "filter must be at most 255 characters long"))]
    pub filter: String,
}

impl PageInput {
    /// Offset of the first row of the requested page.
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub user_id: String,
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters long"))]
    pub name: String,
    #[validate(
        email(message = "Invalid email format"),
        length(max = 255, message = "email must be at most 255 characters long")
    )]
    pub email: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct ChangePasswordInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub user_id: String,
    #[validate(length(min = 1, code = "required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "new_password must be at least 8 characters long"))]
    pub new_password: String,
}

/// Input for `MakeAdmin` and `RemoveAdmin`: the target and the acting admin.
#[derive(Debug, Clone, Validate, Deserialize)]
pub struct AdminActionInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub user_id: String,
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub admin_user_id: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct AddIntersectionIdInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub user_id: String,
    #[validate(length(min = 1, code = "required"))]
    pub intersection_id: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct RemoveIntersectionIdsInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub user_id: String,
    pub intersection_ids: Vec<String>,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct IntersectionDetailsInput {
    #[validate(length(min = 1, max = 255, message = "address must be between 1 and 255 characters long"))]
    pub address: String,
    #[validate(length(min = 1, max = 255, message = "city must be between 1 and 255 characters long"))]
    pub city: String,
    #[validate(length(min = 1, max = 255, message = "province must be between 1 and 255 characters long"))]
    pub province: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct SimulationParametersInput {
    pub intersection_type: IntersectionType,
    #[validate(range(min = 1, message = "green must be a positive number"))]
    pub green: i32,
    #[validate(range(min = 1, message = "yellow must be a positive number"))]
    pub yellow: i32,
    #[validate(range(min = 1, message = "red must be a positive number"))]
    pub red: i32,
    #[validate(range(min = 1, max = 200, message = "speed must be between 1 and 200"))]
    pub speed: i32,
    pub seed: i32,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct OptimisationParametersInput {
    pub optimisation_type: OptimisationType,
    #[validate(nested)]
    pub parameters: SimulationParametersInput,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct CreateIntersectionInput {
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters long"))]
    pub name: String,
    #[validate(nested)]
    pub details: IntersectionDetailsInput,
    pub traffic_density: TrafficDensity,
    #[validate(nested)]
    pub default_parameters: OptimisationParametersInput,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct IntersectionIdInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub id: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct UpdateIntersectionInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub id: String,
    #[validate(length(min = 2, max = 100, message = "name must be between 2 and 100 characters long"))]
    pub name: String,
    #[validate(nested)]
    pub details: IntersectionDetailsInput,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct PutOptimisationInput {
    #[validate(length(min = 1, code = "required"), custom(function = uuid_format))]
    pub id: String,
    #[validate(nested)]
    pub parameters: OptimisationParametersInput,
}

impl From<SimulationParametersInput> for crate::domain::SimulationParameters {
    fn from(input: SimulationParametersInput) -> Self {
        Self {
            intersection_type: input.intersection_type,
            green: input.green,
            yellow: input.yellow,
            red: input.red,
            speed: input.speed,
            seed: input.seed,
        }
    }
}

impl From<OptimisationParametersInput> for crate::domain::OptimisationParameters {
    fn from(input: OptimisationParametersInput) -> Self {
        Self {
            optimisation_type: input.optimisation_type,
            parameters: input.parameters.into(),
        }
    }
}

impl From<IntersectionDetailsInput> for crate::domain::IntersectionDetails {
    fn from(input: IntersectionDetailsInput) -> Self {
        Self { address: input.address, city: input.city, province: input.province }
    }
}

/// Parse a comma-separated id filter: whitespace-trimmed, empty tokens
/// dropped. An empty result means "match all".
pub fn parse_id_filter(filter: &str) -> Vec<String> {
    filter
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: ServiceError) -> BTreeMap<String, String> {
        match err {
            ServiceError::Validation { fields, .. } => fields,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn register_input_checks_all_fields() {
        let input = RegisterUserInput {
            name: "A".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let fields = fields(validate(&input).unwrap_err());
        assert_eq!(fields["name"], "name must be between 2 and 100 characters long");
        assert_eq!(fields["email"], "Invalid email format");
        assert_eq!(fields["password"], "password must be at least 8 characters long");
    }

    #[test]
    fn user_id_must_be_uuid() {
        let missing = UserIdInput { user_id: String::new() };
        assert_eq!(fields(validate(&missing).unwrap_err())["user_id"], "user_id is required");

        let malformed = UserIdInput { user_id: "nope".to_string() };
        assert_eq!(
            fields(validate(&malformed).unwrap_err())["user_id"],
            "user_id must be a valid UUID"
        );

        let valid = UserIdInput { user_id: Uuid::new_v4().to_string() };
        assert!(validate(&valid).is_ok());
    }

    #[test]
    fn page_bounds_enforced() {
        let input = PageInput { page: 0, page_size: 101, filter: String::new() };
        let fields = fields(validate(&input).unwrap_err());
        assert_eq!(fields["page"], "page must be at least 1");
        assert_eq!(fields["page_size"], "page_size must be between 1 and 100");

        let ok = PageInput { page: 3, page_size: 10, filter: String::new() };
        assert!(validate(&ok).is_ok());
        assert_eq!(ok.offset(), 20);
        assert_eq!(ok.limit(), 10);
    }

    #[test]
    fn simulation_parameter_bounds() {
        let input = PutOptimisationInput {
            id: Uuid::new_v4().to_string(),
            parameters: OptimisationParametersInput {
                optimisation_type: OptimisationType::Gridsearch,
                parameters: SimulationParametersInput {
                    intersection_type: IntersectionType::Roundabout,
                    green: 0,
                    yellow: 3,
                    red: 5,
                    speed: 250,
                    seed: 7,
                },
            },
        };
        let fields = fields(validate(&input).unwrap_err());
        assert_eq!(fields["parameters.parameters.green"], "green must be a positive number");
        assert_eq!(fields["parameters.parameters.speed"], "speed must be between 1 and 200");
    }

    #[test]
    fn id_filter_parsing() {
        assert!(parse_id_filter("").is_empty());
        assert!(parse_id_filter(" , ,").is_empty());
        assert_eq!(parse_id_filter("a, b ,c"), vec!["a", "b", "c"]);
    }
}
