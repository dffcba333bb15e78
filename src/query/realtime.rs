//! Queries against the realtime endpoint.

use crate::error::QueryResult;

use super::{QueryCore, Queryable};

/// A live-data query. No date ranges, segments or paging: the answer is a
/// single page of at most `limit` rows.
#[derive(Clone, Debug)]
pub struct RealtimeQuery {
    core: QueryCore,
}

impl Queryable for RealtimeQuery {
    const SINGLE_PAGE: bool = true;

    fn core(&self) -> &QueryCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QueryCore {
        &mut self.core
    }
}

impl RealtimeQuery {
    pub fn new(core: QueryCore) -> Self {
        Self { core }
    }

    /// At most `n` rows, or every row for zero. Realtime results cannot
    /// start at an offset.
    pub fn limit(&self, n: u32) -> QueryResult<Self> {
        let n = (n > 0).then_some(n);
        self.refine_with(|core| {
            core.set_limit(n.map(|n| n as usize));
            core.params_mut().max_results = n;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::test_support;
    use crate::transport::{Endpoint, ReplayTransport};

    #[test]
    fn limit_sets_max_results_only() {
        let q = RealtimeQuery::new(test_support::core(
            Endpoint::Realtime,
            Arc::new(ReplayTransport::default()),
        ))
        .metrics(["rt:activeUsers"])
        .unwrap()
        .limit(25)
        .unwrap();
        let wire = q.build();
        assert_eq!(wire.endpoint(), Endpoint::Realtime);
        assert_eq!(wire.get_str("max_results").as_deref(), Some("25"));
        assert!(wire.get("start_index").is_none());
        assert_eq!(q.core().limit(), Some(25));

        let unbounded = q.limit(0).unwrap();
        assert_eq!(unbounded.core().limit(), None);
        assert!(unbounded.build().get("max_results").is_none());
    }
}
