// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use rstest::rstest;

use super::{DocTool, Renderer};
use crate::Error;

#[rstest]
#[tokio::test]
async fn test_doc_tool_captures_stdout_verbatim() {
    let tool = DocTool::new("echo").with_args(["doc"]);
    let out = tool.render("alpha/beta").await.unwrap();
    assert_eq!(&out[..], b"doc alpha/beta\n");
}

#[rstest]
#[tokio::test]
async fn test_doc_tool_root_package_is_an_empty_argument() {
    let tool = DocTool::new("echo").with_args(["doc"]);
    let out = tool.render("").await.unwrap();
    // echo joins its arguments with a space, even an empty one
    assert_eq!(&out[..], b"doc \n");
}

#[rstest]
#[tokio::test]
async fn test_doc_tool_nonzero_exit() {
    let tool = DocTool::new("false");
    let err = tool.render("alpha").await.expect_err("false exits with 1");
    assert!(err.is_generation_error());
    match err {
        Error::GeneratorFailed {
            package, status, ..
        } => {
            assert_eq!(package, "alpha");
            assert_eq!(status.code(), Some(1));
        }
        other => panic!("expected a generator failure, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_doc_tool_stderr_is_reported() {
    let tool = DocTool::new("sh").with_args(["-c", "echo 'no such package' >&2; exit 1", "sh"]);
    let err = tool.render("alpha").await.expect_err("script exits with 1");
    match err {
        Error::GeneratorFailed { stderr, .. } => assert_eq!(stderr, "no such package"),
        other => panic!("expected a generator failure, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_doc_tool_missing_program() {
    let tool = DocTool::new("godocfs-this-program-does-not-exist");
    let err = tool.render("alpha").await.expect_err("program cannot be started");
    assert!(matches!(err, Error::GeneratorSpawn { .. }));
}

#[rstest]
#[tokio::test]
async fn test_doc_tool_timeout() {
    let tool = DocTool::new("sleep")
        .with_args(["5"])
        .with_timeout(Some(Duration::from_millis(100)));
    // the package identifier is passed after the args, sleep takes the
    // sum of all its arguments
    let err = tool.render("0").await.expect_err("should time out");
    assert!(matches!(err, Error::GeneratorTimeout { .. }));
}
