use tracing::Span;

/// Per-request identity attached to every log line and audit event along
/// the request path. Built once by the tiered-access middleware and
/// threaded through the orchestrator, session store, and audit logger.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace_id: String,
    pub principal_id: Option<String>,
    pub org_id: Option<String>,
}

impl RequestContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            principal_id: None,
            org_id: None,
        }
    }

    pub fn with_principal(mut self, principal_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self.org_id = Some(org_id.into());
        self
    }

    /// Root span for this request. Every downstream operation should run
    /// inside this span or one of its [`Self::child_span`]s.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "request",
            trace_id = %self.trace_id,
            principal_id = self.principal_id.as_deref().unwrap_or(""),
            org_id = self.org_id.as_deref().unwrap_or(""),
        )
    }

    /// A child span for a named sub-operation (e.g. `"orchestrator.execute"`,
    /// `"mcp.call_tool"`), carrying the same trace id.
    pub fn child_span(&self, operation: &'static str) -> Span {
        tracing::info_span!(
            "operation",
            operation,
            trace_id = %self.trace_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_span_carries_trace_id() {
        let ctx = RequestContext::new("trace-1").with_principal("u1", "o1");
        let _span = ctx.child_span("orchestrator.execute");
        assert_eq!(ctx.trace_id, "trace-1");
        assert_eq!(ctx.principal_id.as_deref(), Some("u1"));
    }
}
