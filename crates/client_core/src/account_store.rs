//! Client-side cached account state: the session, cart, wishlist and the
//! dashboard badge counters.
//!
//! The store is an ordinary owned value. Views receive it by reference and go
//! through the mutation methods below.

use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    domain::{ProductId, Session},
    protocol::{AdminMessage, CartLine, Question, WishlistItem},
};
use tracing::info;

/// Date format the admin console stamps on messages.
pub const ADMIN_MESSAGE_DATE_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BadgeCounts {
    pub cart: usize,
    pub wishlist: usize,
    pub messages_today: usize,
    pub answered_questions: usize,
}

/// Fields a profile edit may change on the cached session.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Default)]
pub struct AccountStore {
    session: Option<Session>,
    cart: Vec<CartLine>,
    wishlist: Vec<WishlistItem>,
    messages_today: usize,
    answered_questions: usize,
    answers_acknowledged: bool,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, session: Session) {
        info!(user_id = %session.id, status = %session.status, "session stored");
        self.session = Some(session);
    }

    /// Drops the session and everything derived from it. Cart and wishlist
    /// are kept: they belong to the browser, not the account.
    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            info!(user_id = %session.id, "session cleared");
        }
        self.messages_today = 0;
        self.answered_questions = 0;
        self.answers_acknowledged = false;
    }

    /// The cached session, or `None` once it has expired. An expired session
    /// is cleared as a side effect.
    pub fn session(&mut self, now: DateTime<Utc>) -> Option<&Session> {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.is_expired(now))
        {
            info!("session expired");
            self.sign_out();
        }
        self.session.as_ref()
    }

    /// The cached session without an expiry check.
    pub fn peek_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn update_profile(&mut self, patch: ProfilePatch) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if let Some(first_name) = patch.first_name {
            session.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            session.last_name = last_name;
        }
        if let Some(photo) = patch.photo {
            session.photo = Some(photo);
        }
        true
    }

    pub fn cart(&self) -> &[CartLine] {
        &self.cart
    }

    pub fn set_cart(&mut self, lines: Vec<CartLine>) {
        self.cart = lines;
    }

    /// Adds a line, merging quantities when the product is already present.
    pub fn add_to_cart(&mut self, line: CartLine) {
        match self
            .cart
            .iter_mut()
            .find(|existing| existing.product_id == line.product_id)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => self.cart.push(line),
        }
    }

    pub fn remove_from_cart(&mut self, product_id: &ProductId) -> Option<CartLine> {
        let index = self
            .cart
            .iter()
            .position(|line| &line.product_id == product_id)?;
        Some(self.cart.remove(index))
    }

    pub fn cart_count(&self) -> usize {
        self.cart.len()
    }

    pub fn wishlist(&self) -> &[WishlistItem] {
        &self.wishlist
    }

    pub fn set_wishlist(&mut self, items: Vec<WishlistItem>) {
        self.wishlist = items;
    }

    /// Returns `true` when the item is on the wishlist afterwards.
    pub fn toggle_wishlist(&mut self, item: WishlistItem) -> bool {
        match self
            .wishlist
            .iter()
            .position(|existing| existing.product_id == item.product_id)
        {
            Some(index) => {
                self.wishlist.remove(index);
                false
            }
            None => {
                self.wishlist.push(item);
                true
            }
        }
    }

    pub fn move_wishlist_to_cart(&mut self, product_id: &ProductId) -> bool {
        let Some(index) = self
            .wishlist
            .iter()
            .position(|item| &item.product_id == product_id)
        else {
            return false;
        };
        let item = self.wishlist.remove(index);
        self.add_to_cart(item.into());
        true
    }

    pub fn wishlist_count(&self) -> usize {
        self.wishlist.len()
    }

    pub fn record_admin_messages(&mut self, messages: &[AdminMessage], today: NaiveDate) {
        self.messages_today = today_message_count(messages, today);
    }

    /// A larger answered count than last time re-arms the QnA badge.
    pub fn record_questions(&mut self, questions: &[Question]) {
        let answered = answered_question_count(questions);
        if answered > self.answered_questions {
            self.answers_acknowledged = false;
        }
        self.answered_questions = answered;
    }

    /// The customer opened the QnA page.
    pub fn acknowledge_answers(&mut self) {
        self.answers_acknowledged = true;
    }

    pub fn badges(&self) -> BadgeCounts {
        BadgeCounts {
            cart: self.cart_count(),
            wishlist: self.wishlist_count(),
            messages_today: self.messages_today,
            answered_questions: if self.answers_acknowledged {
                0
            } else {
                self.answered_questions
            },
        }
    }
}

pub fn today_message_count(messages: &[AdminMessage], today: NaiveDate) -> usize {
    messages
        .iter()
        .filter(|message| {
            NaiveDate::parse_from_str(message.date.trim(), ADMIN_MESSAGE_DATE_FORMAT)
                .is_ok_and(|date| date == today)
        })
        .count()
}

pub fn answered_question_count(questions: &[Question]) -> usize {
    questions.iter().filter(|question| question.is_answered()).count()
}

#[cfg(test)]
#[path = "tests/account_store_tests.rs"]
mod tests;
