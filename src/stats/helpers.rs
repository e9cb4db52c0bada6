use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use std::collections::HashMap;

use crate::accounts::data::{Identity, IdentityID, RequestContext};
use crate::accounts::helpers::{get_identity, get_profile, list_identities};
use crate::goals::data::{Goal, GoalID, GoalSummary};
use crate::goals::helpers::{centi_to_hours, current_goals};
use crate::internal_error::{InternalError, InternalResult};

use super::data::*;

pub const TOP_USERS: usize = 3;
pub const HISTOGRAM_DAYS: u32 = 7;

pub fn goal_task_counts(db_connection: &Connection, goal_id: GoalID) -> InternalResult<TaskCounts> {
    let counts = db_connection.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_completed), 0) FROM goal_tasks WHERE goal_id = ?1",
        params![goal_id],
        |row| {
            Ok(TaskCounts {
                total: row.get(0)?,
                completed: row.get(1)?,
            })
        },
    )?;

    Ok(counts)
}

pub fn goal_completion_percentage(db_connection: &Connection, goal_id: GoalID) -> InternalResult<u32> {
    Ok(goal_task_counts(db_connection, goal_id)?.completion_percentage())
}

pub fn goal_total_hours(db_connection: &Connection, goal_id: GoalID) -> InternalResult<Decimal> {
    let centi: i64 = db_connection.query_row(
        "SELECT COALESCE(SUM(hours_centi), 0) FROM hour_logs WHERE goal_id = ?1",
        params![goal_id],
        |row| row.get(0),
    )?;

    Ok(centi_to_hours(centi))
}

/// Whole days from `today` to the goal's target date; negative once overdue.
pub fn days_until_target(goal: &Goal, today: NaiveDate) -> Option<i64> {
    goal.target_date
        .map(|target_date| (target_date - today).num_days())
}

pub fn target_date_status(days: Option<i64>) -> String {
    match days {
        None => "No target date set".to_string(),
        Some(days) if days < 0 => format!("Overdue by {} days", -days),
        Some(0) => "Due today".to_string(),
        Some(1) => "Due tomorrow".to_string(),
        Some(days) if days <= 7 => format!("Due in {} days (this week)", days),
        Some(days) if days <= 30 => format!("Due in {} days (within a month)", days),
        Some(days) => format!("Due in {} days", days),
    }
}

pub fn summarize_goal(
    db_connection: &Connection,
    goal: Goal,
    today: NaiveDate,
) -> InternalResult<GoalSummary> {
    let counts = goal_task_counts(db_connection, goal.id)?;
    let days = days_until_target(&goal, today);

    Ok(GoalSummary {
        completion_percentage: counts.completion_percentage(),
        total_tasks: counts.total,
        completed_tasks: counts.completed,
        total_hours: goal_total_hours(db_connection, goal.id)?,
        days_until_target: days,
        target_date_status: target_date_status(days),
        goal,
    })
}

pub fn summarize_goals(
    db_connection: &Connection,
    goals: Vec<Goal>,
    today: NaiveDate,
) -> InternalResult<Vec<GoalSummary>> {
    goals
        .into_iter()
        .map(|goal| summarize_goal(db_connection, goal, today))
        .collect()
}

fn count(db_connection: &Connection, sql: &str, identity_id: IdentityID) -> InternalResult<u32> {
    Ok(db_connection.query_row(sql, params![identity_id], |row| row.get(0))?)
}

pub fn user_stats(
    db_connection: &Connection,
    identity: &Identity,
    actor_id: IdentityID,
) -> InternalResult<UserStats> {
    let completed_goals_count = count(
        db_connection,
        "SELECT COUNT(*) FROM goals WHERE owner_id = ?1 AND status = 'COMPLETED'",
        identity.id,
    )?;
    let total_goals_count = count(
        db_connection,
        "SELECT COUNT(*) FROM goals WHERE owner_id = ?1",
        identity.id,
    )?;
    let completed_tasks_count = count(
        db_connection,
        "SELECT COUNT(*) FROM user_tasks WHERE owner_id = ?1 AND is_completed",
        identity.id,
    )?;
    let tasks_in_progress_count = count(
        db_connection,
        "SELECT COUNT(*) FROM user_tasks WHERE owner_id = ?1 AND NOT is_completed",
        identity.id,
    )?;
    let total_hours: i64 = db_connection.query_row(
        "SELECT COALESCE(SUM(h.hours_centi), 0) FROM hour_logs h \
         JOIN goals g ON g.id = h.goal_id WHERE g.owner_id = ?1",
        params![identity.id],
        |row| row.get(0),
    )?;

    Ok(UserStats {
        user_id: identity.id,
        username: identity.username.clone(),
        completed_goals_count,
        total_goals_count,
        goals_completion_percentage: completion_percentage(completed_goals_count, total_goals_count),
        completed_tasks_count,
        tasks_in_progress_count,
        total_hours: centi_to_hours(total_hours),
        is_current_user: identity.id == actor_id,
    })
}

/// Stats for every identity in username order.
fn collect_user_stats(db_connection: &Connection, actor_id: IdentityID) -> InternalResult<Vec<UserStats>> {
    list_identities(db_connection)?
        .iter()
        .map(|identity| user_stats(db_connection, identity, actor_id))
        .collect()
}

/// Stable descending sort; ties keep username order.
pub fn sort_user_stats(stats: &mut [UserStats], sort_key: SortKey) {
    stats.sort_by(|a, b| sort_key.compare_descending(a, b));
}

pub fn leaderboard(
    db_connection: &mut Connection,
    actor_id: IdentityID,
    sort_key: SortKey,
) -> InternalResult<Vec<UserStats>> {
    let tx = db_connection.transaction()?;
    let mut stats = collect_user_stats(&tx, actor_id)?;
    tx.commit()?;

    sort_user_stats(&mut stats, sort_key);
    Ok(stats)
}

pub fn top_n(mut stats: Vec<UserStats>, n: usize) -> Vec<UserStats> {
    stats.truncate(n);
    stats
}

/// Tasks finished per day over the `window_days` ending `today`, oldest
/// first, with zero entries for quiet days. Both goal tasks and standalone
/// tasks count.
pub fn daily_completion_histogram(
    db_connection: &Connection,
    identity_id: IdentityID,
    today: NaiveDate,
    window_days: u32,
) -> InternalResult<Vec<DayCount>> {
    if window_days == 0 {
        return Ok(vec![]);
    }

    let start = today - Duration::days(i64::from(window_days) - 1);

    let mut statement = db_connection.prepare(
        "SELECT completed_date, COUNT(*) FROM ( \
             SELECT completed_date FROM user_tasks \
             WHERE owner_id = ?1 AND is_completed AND completed_date BETWEEN ?2 AND ?3 \
             UNION ALL \
             SELECT t.completed_date FROM goal_tasks t JOIN goals g ON g.id = t.goal_id \
             WHERE g.owner_id = ?1 AND t.is_completed AND t.completed_date BETWEEN ?2 AND ?3 \
         ) GROUP BY completed_date",
    )?;

    let counts = statement
        .query_map(params![identity_id, start, today], |row| {
            Ok((row.get::<usize, NaiveDate>(0)?, row.get::<usize, u32>(1)?))
        })?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;

    Ok(start
        .iter_days()
        .take(window_days as usize)
        .map(|date| DayCount {
            date,
            count: counts.get(&date).copied().unwrap_or(0),
        })
        .collect())
}

pub fn dashboard(db_connection: &mut Connection, ctx: &RequestContext) -> InternalResult<DashboardPage> {
    let tx = db_connection.transaction()?;

    let own = user_stats(&tx, &ctx.actor, ctx.actor.id)?;
    let goals = summarize_goals(&tx, current_goals(&tx, ctx.actor.id)?, ctx.today)?;
    let mut everyone = collect_user_stats(&tx, ctx.actor.id)?;
    tx.commit()?;

    sort_user_stats(&mut everyone, SortKey::CompletedTasksCount);

    Ok(DashboardPage {
        completed_tasks_count: own.completed_tasks_count,
        total_goals_count: own.total_goals_count,
        completed_goals_count: own.completed_goals_count,
        goals_completion_percentage: own.goals_completion_percentage,
        current_goals: goals,
        top_users: top_n(everyone, TOP_USERS),
        is_admin: ctx.is_staff(),
        messages: None,
    })
}

/// Public profile of `user_id` with the leading other users by goal completion.
pub fn user_detail(
    db_connection: &mut Connection,
    ctx: &RequestContext,
    user_id: IdentityID,
) -> InternalResult<UserDetailPage> {
    let tx = db_connection.transaction()?;

    let profile_user = get_identity(&tx, user_id)?.ok_or(InternalError::NotFound("User"))?;
    let stats = user_stats(&tx, &profile_user, ctx.actor.id)?;
    let goals = summarize_goals(&tx, current_goals(&tx, profile_user.id)?, ctx.today)?;
    let profile = get_profile(&tx, profile_user.id)?;
    let mut others: Vec<UserStats> = collect_user_stats(&tx, ctx.actor.id)?
        .into_iter()
        .filter(|stats| stats.user_id != profile_user.id)
        .collect();
    tx.commit()?;

    sort_user_stats(&mut others, SortKey::GoalsCompletionPercentage);

    Ok(UserDetailPage {
        profile_user,
        profile,
        stats,
        current_goals: goals,
        top_users: top_n(others, TOP_USERS),
        is_admin: ctx.is_staff(),
        messages: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::helpers::tests::{insert_identity, now};
    use crate::data::open_test_database;
    use crate::goals::data::GoalStatus;
    use crate::goals::helpers::tests::{ctx_for, goal_input, task_input};
    use crate::goals::helpers::{create_goal, create_task_for_goal, toggle_goal_task};
    use crate::tasks::data::{UserTaskInput, UserTaskStatus};
    use crate::tasks::helpers::{create_user_task, toggle_user_task};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn completed_task(owner_id: IdentityID, title: &str) -> UserTaskInput {
        UserTaskInput {
            owner_id,
            title: title.to_string(),
            description: String::new(),
            status: UserTaskStatus::Completed,
            priority: Default::default(),
            due_date: None,
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(1, 2), 50);
        assert_eq!(completion_percentage(2, 2), 100);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 8), 13);
    }

    #[test]
    fn target_status_buckets() {
        let cases = [
            (None, "No target date set"),
            (Some(-3), "Overdue by 3 days"),
            (Some(0), "Due today"),
            (Some(1), "Due tomorrow"),
            (Some(2), "Due in 2 days (this week)"),
            (Some(7), "Due in 7 days (this week)"),
            (Some(8), "Due in 8 days (within a month)"),
            (Some(30), "Due in 30 days (within a month)"),
            (Some(31), "Due in 31 days"),
        ];

        for (days, expected) in cases {
            assert_eq!(target_date_status(days), expected);
        }
    }

    #[test]
    fn days_until_target_counts_calendar_days() {
        let mut db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let mut input = goal_input("Trip");
        input.target_date = Some(day("2024-05-20"));
        let goal = create_goal(&mut db_connection, &ctx_for(&alice), input).unwrap();

        assert_eq!(days_until_target(&goal, day("2024-05-10")), Some(10));
        assert_eq!(days_until_target(&goal, day("2024-05-22")), Some(-2));
    }

    #[test]
    fn leaderboard_sorts_descending_with_fallback() {
        let mut db_connection = open_test_database();
        let counts = [("amy", 5), ("ben", 2), ("cat", 8)];
        for (name, done) in counts {
            let identity = insert_identity(&db_connection, name, false);
            let ctx = ctx_for(&identity);
            for i in 0..done {
                create_user_task(&db_connection, &ctx, completed_task(identity.id, &format!("t{}", i)))
                    .unwrap();
            }
        }

        for sort_by in [Some("completed_tasks_count"), Some("bogus"), None] {
            let board = leaderboard(&mut db_connection, 1, SortKey::from_query(sort_by)).unwrap();
            let order: Vec<u32> = board.iter().map(|s| s.completed_tasks_count).collect();
            assert_eq!(order, vec![8, 5, 2]);
            assert_eq!(top_n(board, 3).len(), 3);
        }

        assert!(top_n(vec![], 3).is_empty());
    }

    #[test]
    fn ties_keep_username_order() {
        let mut db_connection = open_test_database();
        for name in ["zoe", "adam", "mike"] {
            insert_identity(&db_connection, name, false);
        }

        let board = leaderboard(&mut db_connection, 1, SortKey::TotalHours).unwrap();
        let names: Vec<&str> = board.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["adam", "mike", "zoe"]);
        assert!(board.iter().find(|s| s.username == "zoe").unwrap().is_current_user);
    }

    #[test]
    fn user_stats_count_goals_and_tasks() {
        let mut db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let ctx = ctx_for(&alice);

        let mut done = goal_input("Done");
        done.status = GoalStatus::Completed;
        create_goal(&mut db_connection, &ctx, done).unwrap();
        create_goal(&mut db_connection, &ctx, goal_input("Open")).unwrap();
        create_goal(&mut db_connection, &ctx, goal_input("Also open")).unwrap();
        create_user_task(&db_connection, &ctx, completed_task(alice.id, "finished")).unwrap();
        let mut pending = completed_task(alice.id, "pending");
        pending.status = UserTaskStatus::Todo;
        create_user_task(&db_connection, &ctx, pending).unwrap();

        let stats = user_stats(&db_connection, &alice, alice.id).unwrap();
        assert_eq!(stats.completed_goals_count, 1);
        assert_eq!(stats.total_goals_count, 3);
        assert_eq!(stats.goals_completion_percentage, 33);
        assert_eq!(stats.completed_tasks_count, 1);
        assert_eq!(stats.tasks_in_progress_count, 1);
        assert_eq!(stats.total_hours, Decimal::ZERO);
    }

    #[test]
    fn histogram_is_dense_and_bounded() {
        let mut db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let ctx = ctx_for(&alice);

        let goal = create_goal(&mut db_connection, &ctx, goal_input("Write")).unwrap();
        let (_, chapter) =
            create_task_for_goal(&db_connection, &ctx, goal.id, task_input("Chapter", false)).unwrap();
        toggle_goal_task(&mut db_connection, &ctx, goal.id, chapter.id).unwrap();
        let user_task = create_user_task(&db_connection, &ctx, completed_task(alice.id, "a")).unwrap();
        let mut pending = completed_task(alice.id, "b");
        pending.status = UserTaskStatus::Todo;
        let pending = create_user_task(&db_connection, &ctx, pending).unwrap();

        let mut three_days_ago = ctx.clone();
        three_days_ago.today = ctx.today - Duration::days(3);
        toggle_user_task(&db_connection, &three_days_ago, pending.id).unwrap();

        db_connection
            .execute(
                "UPDATE user_tasks SET completed_date = ?1 WHERE id = ?2",
                params![ctx.today - Duration::days(9), user_task.id],
            )
            .unwrap();

        let histogram = daily_completion_histogram(&db_connection, alice.id, now().date(), 7).unwrap();
        assert_eq!(histogram.len(), 7);
        assert_eq!(histogram[0].date, now().date() - Duration::days(6));
        assert_eq!(histogram[6].date, now().date());

        let counts: Vec<u32> = histogram.iter().map(|day| day.count).collect();
        assert_eq!(counts, vec![0, 0, 0, 1, 0, 0, 1]);

        assert!(daily_completion_histogram(&db_connection, alice.id, now().date(), 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn user_detail_excludes_viewed_user_from_top_users() {
        let mut db_connection = open_test_database();
        let alice = insert_identity(&db_connection, "alice", false);
        let bob = insert_identity(&db_connection, "bob", false);
        let carol = insert_identity(&db_connection, "carol", false);

        let mut done = goal_input("Done");
        done.status = GoalStatus::Completed;
        create_goal(&mut db_connection, &ctx_for(&carol), done).unwrap();

        let page = user_detail(&mut db_connection, &ctx_for(&bob), alice.id).unwrap();
        assert_eq!(page.profile_user.id, alice.id);
        let names: Vec<&str> = page.top_users.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(names, vec!["carol", "bob"]);
        assert!(page.top_users[1].is_current_user);

        assert!(matches!(
            user_detail(&mut db_connection, &ctx_for(&bob), 999),
            Err(InternalError::NotFound("User"))
        ));
    }
}
