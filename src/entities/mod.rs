pub mod access_token;
pub mod invoice;
pub mod payment_record;
pub mod project;
pub mod quote;
pub mod quote_line_item;
