//! Bounded, ellipsis-compressed page windows.
//!
//! The remote API happily reports tens of thousands of pages but only serves
//! the first few hundred, so every computation starts by clamping the total
//! to a policy cap.

use std::fmt;

/// Default page cap, matching what the remote API will actually serve.
pub const DEFAULT_PAGE_CAP: u32 = 500;

/// Totals at or below this are shown in full.
const FULL_LIST_THRESHOLD: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToken {
    Page(u32),
    Ellipsis,
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Page(n) => write!(f, "{}", n),
            PageToken::Ellipsis => f.write_str("..."),
        }
    }
}

/// Compute the page tokens to display.
///
/// Always contains pages 1, 2 and the last two pages, plus the current
/// page's immediate neighbourhood; never more than 9 tokens.
pub fn compute(current_page: u32, total_pages: u32, hard_cap: u32) -> Vec<PageToken> {
    let total = total_pages.min(hard_cap);

    if total == 0 {
        return Vec::new();
    }

    if total <= FULL_LIST_THRESHOLD {
        return (1..=total).map(PageToken::Page).collect();
    }

    let mut tokens = vec![PageToken::Page(1), PageToken::Page(2)];

    let start = current_page.saturating_sub(1).max(3);
    let end = current_page.saturating_add(1).min(total - 2);

    if start > 3 {
        tokens.push(PageToken::Ellipsis);
    }

    tokens.extend(
        (start..=end)
            .filter(|&p| p > 2 && p < total - 1)
            .map(PageToken::Page),
    );

    if end < total - 2 {
        tokens.push(PageToken::Ellipsis);
    }

    tokens.push(PageToken::Page(total - 1));
    tokens.push(PageToken::Page(total));
    tokens
}

/// Navigation targets around the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNav {
    pub first: u32,
    pub prev: u32,
    pub next: u32,
    pub last: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

impl PageNav {
    /// Returns `None` when there is nothing to paginate.
    pub fn new(current_page: u32, total_pages: u32, hard_cap: u32) -> Option<Self> {
        let last = total_pages.min(hard_cap);
        if last == 0 {
            return None;
        }

        Some(Self {
            first: 1,
            prev: current_page.saturating_sub(1).max(1),
            next: current_page.saturating_add(1).min(last),
            last,
            has_prev: current_page > 1,
            has_next: current_page < last,
        })
    }
}

/// Render tokens on one line, bracketing the current page.
pub fn render(tokens: &[PageToken], current_page: u32) -> String {
    tokens
        .iter()
        .map(|token| match token {
            PageToken::Page(n) if *n == current_page => format!("[{}]", n),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
