use serde::Serialize;

/// The slice of an employee the attendance and leave engine needs: identity
/// and a display name for administrative listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeRef {
    pub id: u64,
    pub name: String,
}

impl EmployeeRef {
    pub fn new(id: u64, first_name: &str, last_name: Option<&str>) -> Self {
        let name = match last_name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(last) => format!("{} {}", first_name.trim(), last),
            None => first_name.trim().to_string(),
        };
        Self { id, name }
    }
}
