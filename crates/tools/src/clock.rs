//! Clock tool: reports the current time.
//!
//! Reads an optional `utc_offset_minutes` from the run's configurable
//! values, so callers can localize without the model having to know.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use turngraph_core::error::ToolError;
use turngraph_core::tool::{InvocationContext, Tool, ToolArgs};

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current date and time as an RFC 3339 timestamp."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn invoke(
        &self,
        _args: &ToolArgs,
        context: Option<&InvocationContext>,
    ) -> Result<serde_json::Value, ToolError> {
        if let Some(ctx) = context {
            if ctx.cancel.is_cancelled() {
                return Err(ToolError::Cancelled(self.name().into()));
            }
        }

        let offset_minutes = context
            .and_then(|ctx| ctx.configurable.get("utc_offset_minutes"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let offset = offset_minutes
            .checked_mul(60)
            .and_then(|secs| i32::try_from(secs).ok())
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "utc_offset_minutes out of range: {offset_minutes}"
                ))
            })?;

        tracing::debug!(offset_minutes, "Reading clock");

        Ok(serde_json::json!({
            "now": Utc::now().with_timezone(&offset).to_rfc3339(),
            "utc_offset_minutes": offset_minutes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_offset(minutes: i64) -> InvocationContext {
        let mut ctx = InvocationContext::default();
        ctx.configurable
            .insert("utc_offset_minutes".into(), serde_json::json!(minutes));
        ctx
    }

    #[tokio::test]
    async fn defaults_to_utc() {
        let value = ClockTool.invoke(&ToolArgs::new(), None).await.unwrap();
        assert_eq!(value["utc_offset_minutes"], 0);
        assert!(value["now"].as_str().unwrap().ends_with("+00:00"));
    }

    #[tokio::test]
    async fn applies_configured_offset() {
        let ctx = context_with_offset(330);
        let value = ClockTool
            .invoke(&ToolArgs::new(), Some(&ctx))
            .await
            .unwrap();
        assert!(value["now"].as_str().unwrap().ends_with("+05:30"));
    }

    #[tokio::test]
    async fn rejects_absurd_offset() {
        let ctx = context_with_offset(100_000);
        assert!(matches!(
            ClockTool.invoke(&ToolArgs::new(), Some(&ctx)).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn rejects_offsets_that_overflow_seconds() {
        for minutes in [i64::MAX, i64::MIN, i64::MAX / 60 + 1] {
            let ctx = context_with_offset(minutes);
            assert!(matches!(
                ClockTool.invoke(&ToolArgs::new(), Some(&ctx)).await,
                Err(ToolError::InvalidArguments(_))
            ));
        }
    }

    #[tokio::test]
    async fn honours_cancellation() {
        let ctx = InvocationContext::default();
        ctx.cancel.cancel();
        assert!(matches!(
            ClockTool.invoke(&ToolArgs::new(), Some(&ctx)).await,
            Err(ToolError::Cancelled(_))
        ));
    }
}
