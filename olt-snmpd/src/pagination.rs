use shared::types::Page;

/// Clamp the requested window and slice `items`. A page past the end is
/// empty, not an error.
pub fn paginate<T: Clone>(
    items: &[T],
    page: Option<i64>,
    limit: Option<i64>,
    default_page_size: usize,
    max_page_size: usize,
) -> Page<T> {
    let page_size = match limit {
        Some(limit) if limit > 0 => (limit as u64).min(max_page_size as u64) as usize,
        _ => default_page_size,
    };
    let page = match page {
        Some(page) if page >= 1 => page as u64 as usize,
        _ => 1,
    };

    let total_rows = items.len();
    let start = (page - 1).saturating_mul(page_size);
    let data = if start >= total_rows {
        Vec::new()
    } else {
        let end = start.saturating_add(page_size).min(total_rows);
        items[start..end].to_vec()
    };

    Page {
        page,
        page_size,
        page_count: total_rows.div_ceil(page_size),
        total_rows,
        data,
    }
}
