//! `richmenu-line` — LINE Messaging API rich menu client.
//!
//! Stateless wrappers for the calls the publishing pipeline makes, in the
//! order it makes them:
//!
//! | Call              | Endpoint                                         |
//! |-------------------|--------------------------------------------------|
//! | `list_menus`      | `GET  /v2/bot/richmenu/list`                     |
//! | `delete_menu`     | `DELETE /v2/bot/richmenu/{id}`                   |
//! | `create_menu`     | `POST /v2/bot/richmenu`                          |
//! | `upload_content`  | `POST /v2/bot/richmenu/{id}/content` (data host) |
//! | `update_alias`    | `POST /v2/bot/richmenu/alias/{aliasId}`          |
//! | `create_alias`    | `POST /v2/bot/richmenu/alias`                    |
//! | `set_default`     | `POST /v2/bot/user/all/richmenu/{id}`            |
//! | `link_user`       | `POST /v2/bot/user/{userId}/richmenu/{id}`       |
//!
//! No call is retried here; retry policy belongs to the caller.

pub mod client;
pub mod descriptor;
pub mod error;

pub use client::{LineClient, PublishClient, RemoteMenu};
pub use descriptor::{
    build_descriptor, Bounds, LocalArea, MenuLayout, RemoteArea, RichMenuDescriptor, Size,
};
pub use error::{LineError, Result};
