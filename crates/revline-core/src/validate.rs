//! Caller-input validation, applied before a request reaches the
//! orchestrator.

use revline_store::models::NewBuild;

use crate::error::ValidationError;

/// Validate a build request. The orchestrator assumes its input already
/// passed this check.
pub fn validate_build_request(request: &NewBuild) -> Result<(), ValidationError> {
    if request.vehicle.trim().is_empty() {
        return Err(ValidationError::EmptyVehicle);
    }
    if request.goals.trim().is_empty() {
        return Err(ValidationError::EmptyGoals);
    }
    if matches!(request.budget, Some(budget) if budget <= 0) {
        return Err(ValidationError::NonPositiveBudget);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> NewBuild {
        NewBuild {
            user_id: Uuid::new_v4(),
            vehicle: "2008 Honda S2000".into(),
            goals: "sharper track handling".into(),
            budget: Some(5_000),
            constraints: vec![],
            city: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(validate_build_request(&request()), Ok(()));
    }

    #[test]
    fn blank_vehicle_rejected() {
        let mut r = request();
        r.vehicle = "   ".into();
        assert_eq!(
            validate_build_request(&r),
            Err(ValidationError::EmptyVehicle)
        );
    }

    #[test]
    fn blank_goals_rejected() {
        let mut r = request();
        r.goals = String::new();
        assert_eq!(validate_build_request(&r), Err(ValidationError::EmptyGoals));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut r = request();
        r.budget = Some(0);
        assert_eq!(
            validate_build_request(&r),
            Err(ValidationError::NonPositiveBudget)
        );
    }

    #[test]
    fn missing_budget_is_fine() {
        let mut r = request();
        r.budget = None;
        assert_eq!(validate_build_request(&r), Ok(()));
    }
}
