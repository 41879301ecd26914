// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

pub mod adapter;
pub mod config;
pub mod engine;
pub mod message;
pub mod prompt;
pub mod proxy;
pub mod session;
pub mod store;
pub mod stream;
pub mod toolcall;
pub mod upstream;
