use crate::error::CoreError;
use crate::AppState;

pub const PLAN_PRO: &str = "pro";

/// Participant cap for a plan, `None` when unlimited.
pub fn max_participants(config: &crate::AppConfig, plan: Option<&str>) -> Option<u32> {
    let limit = match plan {
        Some(PLAN_PRO) => config.pro_max_participants,
        _ => config.default_max_participants,
    };
    (limit > 0).then_some(limit)
}

/// May the room hold `proposed_count` live participants?
pub async fn capacity_allows(
    state: &AppState,
    room_id: i64,
    proposed_count: usize,
) -> Result<bool, CoreError> {
    let plan = match state.plan_cache.get(&room_id).await {
        Some(plan) => plan,
        None => {
            let plan = parley_db::rooms::get_room_owner_plan(&state.db, room_id).await?;
            state.plan_cache.insert(room_id, plan.clone()).await;
            plan
        }
    };
    Ok(match max_participants(&state.config, plan.as_deref()) {
        Some(limit) => proposed_count <= limit as usize,
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppConfig;

    #[test]
    fn zero_means_unlimited() {
        let config = AppConfig {
            default_max_participants: 5,
            pro_max_participants: 0,
            ..AppConfig::default()
        };
        assert_eq!(max_participants(&config, None), Some(5));
        assert_eq!(max_participants(&config, Some("free")), Some(5));
        assert_eq!(max_participants(&config, Some("pro")), None);
    }
}
