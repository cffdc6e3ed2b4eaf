//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O.

mod account;
pub mod result;
mod token;

pub use account::{
    generate_account_number, Account, AccountUpdate, BalanceReceipt, NewAccount, TransferIntent,
    MAX_ACCOUNT_NUMBER, MIN_ACCOUNT_NUMBER,
};
pub use result::{Error, Result, TokenError};
pub use token::{TokenClaims, TOKEN_ALGORITHM};
pub(crate) use token::TokenHeader;
