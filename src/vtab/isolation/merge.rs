//! K-way (here: two-way) merge of a connection's overlay against the
//! underlying table's own scan, preserving sort order without requiring
//! either side to be materialized ahead of time.
//!
//! Both inputs are assumed already sorted ascending by `pk_columns`. On a
//! tie the overlay side wins unconditionally — an overlay row always
//! represents the connection's own, more recent write.

use crate::error::QuereusResult;
use crate::value::{Row, SqlValue};
use futures_core::stream::BoxStream;
use futures_util::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

fn pk_of(row: &[SqlValue], pk_columns: &[usize]) -> Vec<SqlValue> {
    pk_columns.iter().map(|i| row[*i].clone()).collect()
}

fn pk_cmp(a: &[SqlValue], b: &[SqlValue]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.compare(y, crate::value::Collation::Binary);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

struct MergeState {
    underlying: BoxStream<'static, QuereusResult<Row>>,
    overlay: BoxStream<'static, QuereusResult<Row>>,
    buffered_underlying: Option<QuereusResult<Row>>,
    buffered_overlay: Option<QuereusResult<Row>>,
    pk_columns: Vec<usize>,
}

fn poll_merge(state: &mut MergeState, cx: &mut Context<'_>) -> Poll<Option<QuereusResult<Row>>> {
    if state.buffered_underlying.is_none() {
        match Pin::new(&mut state.underlying).poll_next(cx) {
            Poll::Ready(item) => state.buffered_underlying = item,
            Poll::Pending => {
                // Still try the overlay side so a slow underlying source
                // doesn't stall rows the connection itself just wrote.
                if state.buffered_overlay.is_none() {
                    if let Poll::Ready(item) = Pin::new(&mut state.overlay).poll_next(cx) {
                        state.buffered_overlay = item;
                    } else {
                        return Poll::Pending;
                    }
                }
            }
        }
    }
    if state.buffered_overlay.is_none() {
        if let Poll::Ready(item) = Pin::new(&mut state.overlay).poll_next(cx) {
            state.buffered_overlay = item;
        } else if state.buffered_underlying.is_none() {
            return Poll::Pending;
        }
    }

    match (&state.buffered_underlying, &state.buffered_overlay) {
        (None, None) => Poll::Ready(None),
        (Some(_), None) => Poll::Ready(state.buffered_underlying.take()),
        (None, Some(_)) => Poll::Ready(state.buffered_overlay.take()),
        (Some(Err(_)), _) => Poll::Ready(state.buffered_underlying.take()),
        (_, Some(Err(_))) => Poll::Ready(state.buffered_overlay.take()),
        (Some(Ok(u)), Some(Ok(o))) => {
            let u_pk = pk_of(u, &state.pk_columns);
            let o_pk = pk_of(o, &state.pk_columns);
            match pk_cmp(&u_pk, &o_pk) {
                std::cmp::Ordering::Less => Poll::Ready(state.buffered_underlying.take()),
                // Equal primary keys: the overlay row overrides the
                // underlying one regardless of which side it came from.
                std::cmp::Ordering::Equal => {
                    state.buffered_underlying = None;
                    Poll::Ready(state.buffered_overlay.take())
                }
                std::cmp::Ordering::Greater => Poll::Ready(state.buffered_overlay.take()),
            }
        }
    }
}

/// Merge an already-tombstone-filtered underlying scan with a connection's
/// pending overlay writes, both ordered ascending by `pk_columns`.
pub fn merge_streams(
    underlying: BoxStream<'static, QuereusResult<Row>>,
    overlay: BoxStream<'static, QuereusResult<Row>>,
    pk_columns: Vec<usize>,
) -> impl Stream<Item = QuereusResult<Row>> + Send + 'static {
    let state = MergeState {
        underlying,
        overlay,
        buffered_underlying: None,
        buffered_overlay: None,
        pk_columns,
    };
    stream::unfold(state, |mut state| async move {
        std::future::poll_fn(|cx| poll_merge(&mut state, cx))
            .await
            .map(|item| (item, state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::StreamExt;

    fn row(n: i64) -> Row {
        vec![SqlValue::Integer(n)]
    }

    #[tokio::test]
    async fn overlay_row_overrides_matching_underlying_row() {
        let underlying = Box::pin(stream::iter(vec![Ok(row(1)), Ok(row(2)), Ok(row(3))]));
        let overlay = Box::pin(stream::iter(vec![Ok(vec![SqlValue::Integer(2)])]));
        let merged: Vec<Row> = merge_streams(underlying, overlay, vec![0])
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(merged.len(), 3);
    }

    #[tokio::test]
    async fn overlay_insert_interleaves_in_order() {
        let underlying = Box::pin(stream::iter(vec![Ok(row(1)), Ok(row(3))]));
        let overlay = Box::pin(stream::iter(vec![Ok(row(2))]));
        let merged: Vec<i64> = merge_streams(underlying, overlay, vec![0])
            .map(|r| match &r.unwrap()[0] {
                SqlValue::Integer(i) => *i,
                _ => unreachable!(),
            })
            .collect()
            .await;
        assert_eq!(merged, vec![1, 2, 3]);
    }
}
