// Connection paginator - generic forward/backward cursor pagination
// over an abstract ordered source, producing the standard connection
// shape (edges + page info + total count).

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::pagination::cursor::SortKey;

/// Traversal direction relative to the source's canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Raw pagination arguments as supplied by the caller. Cursors are
/// still encoded; decoding happens inside [`paginate`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionArgs {
    pub first: Option<i32>,
    pub after: Option<String>,
    pub last: Option<i32>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

/// An ordered, countable data source.
///
/// `fetch_page` returns rows in traversal order: walking away from the
/// bound along the canonical order for `Forward`, against it for
/// `Backward`. The bound row itself is excluded. `total_count` must
/// reflect the filter-predicate-applied universe without any cursor
/// range, so the reported total is invariant to the pagination window.
#[async_trait]
pub trait ConnectionSource<T>: Send + Sync {
    async fn fetch_page(
        &self,
        bound: Option<&SortKey>,
        direction: Direction,
        limit: Option<u32>,
    ) -> AppResult<Vec<(SortKey, T)>>;

    async fn total_count(&self) -> AppResult<i64>;
}

/// Paginate `source` according to `args`.
///
/// Requests one row beyond the page size to detect a neighbouring page
/// without a second round trip; the page and the total count are
/// fetched in parallel. With neither `first` nor `last` set, all
/// remaining rows are returned with both page flags false.
pub async fn paginate<T, S>(source: &S, args: &ConnectionArgs) -> AppResult<Connection<T>>
where
    T: Send,
    S: ConnectionSource<T> + ?Sized,
{
    if let Some(first) = args.first {
        if first < 0 {
            return Err(AppError::InvalidPaginationArgs(
                "first must be non-negative".to_string(),
            ));
        }
    }
    if let Some(last) = args.last {
        if last < 0 {
            return Err(AppError::InvalidPaginationArgs(
                "last must be non-negative".to_string(),
            ));
        }
    }

    let backward = args.last.is_some() || args.before.is_some();
    if backward && (args.first.is_some() || args.after.is_some()) {
        return Err(AppError::InvalidPaginationArgs(
            "forward (first/after) and backward (last/before) arguments are mutually exclusive"
                .to_string(),
        ));
    }

    let (direction, cursor, limit) = if backward {
        (Direction::Backward, args.before.as_deref(), args.last)
    } else {
        (Direction::Forward, args.after.as_deref(), args.first)
    };

    let bound = cursor.map(SortKey::decode).transpose()?;
    let fetch_limit = limit.map(|l| l as u32 + 1);

    let (mut rows, total_count) = tokio::try_join!(
        source.fetch_page(bound.as_ref(), direction, fetch_limit),
        source.total_count(),
    )?;

    // The probe row only signals that another page exists; it is never
    // part of the returned page or its boundary cursors.
    let mut has_more = false;
    if let Some(limit) = limit {
        if rows.len() > limit as usize {
            rows.truncate(limit as usize);
            has_more = true;
        }
    }

    // Backward traversal walks against the canonical order; restore it.
    if direction == Direction::Backward {
        rows.reverse();
    }

    // With neither page size set the whole remainder is returned and
    // both flags stay false; a cursor alone does not assert a
    // neighbouring page.
    let anchored = limit.is_some() && bound.is_some();
    let page_info = PageInfo {
        has_next_page: match direction {
            Direction::Forward => has_more,
            Direction::Backward => anchored,
        },
        has_previous_page: match direction {
            Direction::Forward => anchored,
            Direction::Backward => has_more,
        },
        start_cursor: rows.first().map(|(key, _)| key.encode()),
        end_cursor: rows.last().map(|(key, _)| key.encode()),
    };

    let edges = rows
        .into_iter()
        .map(|(key, node)| Edge {
            cursor: key.encode(),
            node,
        })
        .collect();

    Ok(Connection {
        edges,
        page_info,
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory source ordered by primary descending, id descending.
    struct VecSource {
        rows: Vec<(i64, &'static str)>,
    }

    impl VecSource {
        fn new(rows: Vec<(i64, &'static str)>) -> Self {
            let mut rows = rows;
            rows.sort_by(|a, b| b.cmp(a));
            VecSource { rows }
        }

        fn key(row: &(i64, &'static str)) -> SortKey {
            SortKey::new(row.0, row.1)
        }

        fn after(key: &SortKey, row: &(i64, &'static str)) -> bool {
            (row.0, row.1.to_string()) < (key.primary, key.id.clone())
        }
    }

    #[async_trait]
    impl ConnectionSource<&'static str> for VecSource {
        async fn fetch_page(
            &self,
            bound: Option<&SortKey>,
            direction: Direction,
            limit: Option<u32>,
        ) -> AppResult<Vec<(SortKey, &'static str)>> {
            let mut rows: Vec<_> = match direction {
                Direction::Forward => self
                    .rows
                    .iter()
                    .filter(|row| bound.map_or(true, |key| Self::after(key, row)))
                    .collect(),
                Direction::Backward => self
                    .rows
                    .iter()
                    .rev()
                    .filter(|row| {
                        bound.map_or(true, |key| !Self::after(key, row) && Self::key(row) != *key)
                    })
                    .collect(),
            };
            if let Some(limit) = limit {
                rows.truncate(limit as usize);
            }
            Ok(rows
                .into_iter()
                .map(|row| (Self::key(row), row.1))
                .collect())
        }

        async fn total_count(&self) -> AppResult<i64> {
            Ok(self.rows.len() as i64)
        }
    }

    fn source() -> VecSource {
        VecSource::new(vec![(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")])
    }

    fn nodes<T: Copy>(connection: &Connection<T>) -> Vec<T> {
        connection.edges.iter().map(|edge| edge.node).collect()
    }

    #[tokio::test]
    async fn first_page_forward() {
        let connection = paginate(
            &source(),
            &ConnectionArgs {
                first: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(nodes(&connection), vec!["e", "d"]);
        assert!(connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);
        assert_eq!(connection.total_count, 5);
    }

    #[tokio::test]
    async fn follows_end_cursor_to_the_last_page() {
        let source = source();
        let first = paginate(
            &source,
            &ConnectionArgs {
                first: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let second = paginate(
            &source,
            &ConnectionArgs {
                first: Some(3),
                after: first.page_info.end_cursor.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(nodes(&second), vec!["b", "a"]);
        assert!(!second.page_info.has_next_page);
        assert!(second.page_info.has_previous_page);
        // Total is invariant to the pagination window.
        assert_eq!(second.total_count, first.total_count);
    }

    #[tokio::test]
    async fn exact_page_boundary_has_no_next() {
        let connection = paginate(
            &source(),
            &ConnectionArgs {
                first: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(connection.edges.len(), 5);
        assert!(!connection.page_info.has_next_page);
    }

    #[tokio::test]
    async fn backward_last_page() {
        let connection = paginate(
            &source(),
            &ConnectionArgs {
                last: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Last two in canonical order, still presented canonically.
        assert_eq!(nodes(&connection), vec!["b", "a"]);
        assert!(!connection.page_info.has_next_page);
        assert!(connection.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn backward_before_cursor() {
        let source = source();
        let all = paginate(&source, &ConnectionArgs::default()).await.unwrap();
        let before = all.edges[3].cursor.clone(); // "b"

        let connection = paginate(
            &source,
            &ConnectionArgs {
                last: Some(2),
                before: Some(before),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(nodes(&connection), vec!["d", "c"]);
        assert!(connection.page_info.has_next_page);
        assert!(connection.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn no_limits_returns_everything() {
        let connection = paginate(&source(), &ConnectionArgs::default())
            .await
            .unwrap();

        assert_eq!(nodes(&connection), vec!["e", "d", "c", "b", "a"]);
        assert!(!connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn empty_source() {
        let connection = paginate(
            &VecSource::new(vec![]),
            &ConnectionArgs {
                first: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(connection.edges.is_empty());
        assert!(!connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);
        assert_eq!(connection.page_info.start_cursor, None);
        assert_eq!(connection.page_info.end_cursor, None);
        assert_eq!(connection.total_count, 0);
    }

    #[tokio::test]
    async fn zero_page_size() {
        let connection = paginate(
            &source(),
            &ConnectionArgs {
                first: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(connection.edges.is_empty());
        assert!(connection.page_info.has_next_page);
        assert_eq!(connection.total_count, 5);
    }

    #[tokio::test]
    async fn negative_page_size_is_rejected() {
        let err = paginate(
            &source(),
            &ConnectionArgs {
                first: Some(-1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidPaginationArgs(_)));
    }

    #[tokio::test]
    async fn mixed_directions_are_rejected() {
        let err = paginate(
            &source(),
            &ConnectionArgs {
                first: Some(2),
                last: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidPaginationArgs(_)));
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let err = paginate(
            &source(),
            &ConnectionArgs {
                first: Some(2),
                after: Some("!!!".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::MalformedCursor(_)));
    }

    #[tokio::test]
    async fn ties_on_primary_are_ordered_by_id() {
        let source = VecSource::new(vec![(7, "a"), (7, "b"), (7, "c")]);
        let first = paginate(
            &source,
            &ConnectionArgs {
                first: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(nodes(&first), vec!["c"]);

        let rest = paginate(
            &source,
            &ConnectionArgs {
                first: Some(5),
                after: first.page_info.end_cursor.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(nodes(&rest), vec!["b", "a"]);
    }
}
