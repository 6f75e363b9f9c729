//! LNURL-withdraw callback executor.

use chrono::Utc;
use std::sync::Arc;
use tapcharge_core::{Invoice, Receipt, WithdrawRequest};

use crate::error::SettlementError;
use crate::traits::CallbackChannel;

/// Settles a regular withdraw request with one GET to the service callback.
pub struct RegularWithdrawExecutor {
    callbacks: Arc<dyn CallbackChannel>,
}

impl RegularWithdrawExecutor {
    pub fn new(callbacks: Arc<dyn CallbackChannel>) -> Self {
        Self { callbacks }
    }

    /// Hand the invoice's payment request to the withdraw service.
    ///
    /// Succeeds only on a 2xx status with an `OK` body. No retries.
    pub async fn execute(
        &self,
        request: &WithdrawRequest,
        invoice: &Invoice,
    ) -> Result<Receipt, SettlementError> {
        tracing::info!(
            invoice_id = %invoice.id,
            callback = %request.callback,
            "sending withdraw callback"
        );

        let response = self
            .callbacks
            .get(
                &request.callback,
                &[("k1", request.k1.as_str()), ("pr", invoice.payment_request.as_str())],
            )
            .await?;

        let accepted = response.is_success_status()
            && response.body.as_ref().is_some_and(|b| b.is_ok());
        if !accepted {
            let reason = response
                .body
                .and_then(|b| b.reason)
                .unwrap_or_else(|| "unexpected response".to_string());
            tracing::warn!(
                invoice_id = %invoice.id,
                http_status = response.http_status,
                %reason,
                "withdraw callback rejected"
            );
            return Err(SettlementError::CallbackRejected {
                http_status: response.http_status,
                reason,
            });
        }

        Ok(Receipt {
            callback: request.callback.clone(),
            http_status: response.http_status,
            completed_at: Utc::now(),
        })
    }
}
