mod callback;
mod common;
mod monitoring;
mod reconcile;
