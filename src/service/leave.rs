use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::{Actor, reconcile};
use crate::error::AppError;
use crate::model::{
    DateRange, DecisionAction, LeaveApplication, LeaveListing, LeaveQuery, LeaveRequest,
    LeaveStatus, MonthlyLeaveSummary, NewLeave,
};
use crate::store::{RecordStore, StoreTx};

/// Leave lifecycle: `Pending` to `Approved` or `Rejected`, once.
///
/// Applying and deciding rewrite the attendance rows of every day in the
/// leave range inside the same transaction as the leave write.
pub struct LeaveService<S> {
    store: Arc<S>,
}

impl<S> Clone for LeaveService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> LeaveService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn apply(
        &self,
        employee_id: u64,
        application: LeaveApplication,
        now: DateTime<Utc>,
    ) -> Result<LeaveRequest, AppError> {
        self.try_apply(employee_id, application, now)
            .await
            .inspect_err(|e| {
                if let Some(err) = e.store_failure() {
                    error!(employee_id, error = %err, "Leave application failed");
                }
            })
    }

    async fn try_apply(
        &self,
        employee_id: u64,
        application: LeaveApplication,
        now: DateTime<Utc>,
    ) -> Result<LeaveRequest, AppError> {
        let range = DateRange::new(application.start_date, application.end_date)
            .ok_or(AppError::InvalidRange)?;

        let mut tx = self.store.begin().await?;
        tx.lock_employee(employee_id).await?;

        if let Some(existing) = tx
            .find_overlapping_leave(employee_id, range, &LeaveStatus::BLOCKING)
            .await?
        {
            debug!(employee_id, existing = existing.id, "Leave overlaps");
            return Err(AppError::OverlappingLeave);
        }

        let leave = tx
            .insert_leave(&NewLeave {
                employee_id,
                leave_type: application.leave_type,
                range,
                reason: application.reason,
                applied_on: now,
            })
            .await?;
        let marked = reconcile::mark_range_on_leave(&mut tx, employee_id, range).await?;
        tx.commit().await?;

        info!(employee_id, leave_id = leave.id, days = marked, "Leave applied");
        Ok(leave)
    }

    /// Approves or rejects a pending request. Every successful call writes;
    /// a request that is no longer pending is refused.
    pub async fn decide(
        &self,
        leave_id: u64,
        actor: &Actor,
        action: &str,
    ) -> Result<LeaveRequest, AppError> {
        self.try_decide(leave_id, actor, action)
            .await
            .inspect_err(|e| {
                if let Some(err) = e.store_failure() {
                    error!(leave_id, error = %err, "Leave decision failed");
                }
            })
    }

    async fn try_decide(
        &self,
        leave_id: u64,
        actor: &Actor,
        action: &str,
    ) -> Result<LeaveRequest, AppError> {
        actor.require_administrative()?;
        let approver_id = actor.employee()?;

        // Owner lookup outside the transaction so the employee lock is always
        // taken before the leave row.
        let owner = self
            .store
            .find_leave(leave_id)
            .await?
            .ok_or(AppError::LeaveNotFound)?
            .employee_id;
        let action: DecisionAction = action
            .parse()
            .map_err(|_| AppError::InvalidAction(action.to_string()))?;

        let mut tx = self.store.begin().await?;
        tx.lock_employee(owner).await?;
        let leave = tx
            .find_leave(leave_id)
            .await?
            .ok_or(AppError::LeaveNotFound)?;
        if leave.status != LeaveStatus::Pending {
            return Err(AppError::AlreadyDecided);
        }

        let status = action.resulting_status();
        let decided = tx
            .update_leave_status(leave_id, status, approver_id)
            .await?;
        let reverted = match action {
            DecisionAction::Reject => {
                reconcile::revert_range_after_rejection(&mut tx, owner, leave.range()).await?
            }
            DecisionAction::Approve => 0,
        };
        tx.commit().await?;

        info!(leave_id, approver_id, %status, reverted, "Leave decided");
        Ok(decided)
    }

    pub async fn list_mine(&self, employee_id: u64) -> Result<Vec<LeaveRequest>, AppError> {
        Ok(self.store.list_employee_leaves(employee_id).await?)
    }

    pub async fn list_all(
        &self,
        actor: &Actor,
        query: &LeaveQuery,
    ) -> Result<(Vec<LeaveListing>, i64), AppError> {
        actor.require_administrative()?;
        Ok(self.store.list_leaves(query).await?)
    }

    /// Administrative users see any request; everyone else only their own.
    pub async fn get(&self, leave_id: u64, actor: &Actor) -> Result<LeaveRequest, AppError> {
        let leave = self
            .store
            .find_leave(leave_id)
            .await?
            .ok_or(AppError::LeaveNotFound)?;
        if actor.role.is_administrative() || actor.employee_id == Some(leave.employee_id) {
            Ok(leave)
        } else {
            Err(AppError::Forbidden("Not your leave request"))
        }
    }

    pub async fn monthly_summary(
        &self,
        actor: &Actor,
        year: i32,
        month: u32,
    ) -> Result<Vec<MonthlyLeaveSummary>, AppError> {
        actor.require_administrative()?;
        if !(1..=12).contains(&month) {
            return Err(AppError::InvalidMonth);
        }
        Ok(self
            .store
            .monthly_approved_leave_aggregates(year, month)
            .await?)
    }
}
