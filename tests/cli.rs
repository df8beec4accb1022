use std::process::{Command, Output};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const GO_MOD: &str = "module example.com/shop\n\ngo 1.21\n";

const MAIN_GO: &str = r#"package main

import (
	"log"

	"example.com/shop/api"
	"example.com/shop/orders"
)

func main() {
	srv := api.NewGRPCServer()
	api.RegisterOrderServiceServer(srv, &orders.Handler{})
	log.Fatal(srv.Serve())
}
"#;

const API_GO: &str = r#"package api

type GRPCServer struct{}

func NewGRPCServer() *GRPCServer { return &GRPCServer{} }

func (s *GRPCServer) Serve() error { return nil }

func RegisterOrderServiceServer(s *GRPCServer, impl interface{}) {}
"#;

const ORDERS_GO: &str = r#"package orders

import "strings"

type Handler struct {
	Store *Store
}

func (h *Handler) Place(id string) {
	h.Store.Save(strings.ToUpper(id))
}

func (h *Handler) Cancel(id string) {
	h.Store.Delete(id)
	h.Place(id)
}

type Store struct{}

func (s *Store) Save(id string) { s.index(id) }

func (s *Store) Delete(id string) {}

func (s *Store) index(id string) { s.Save(id) }
"#;

fn shop() -> TempDir {
    let dir = TempDir::new().unwrap();
    dir.child("go.mod").write_str(GO_MOD).unwrap();
    dir.child("main.go").write_str(MAIN_GO).unwrap();
    dir.child("api/api.go").write_str(API_GO).unwrap();
    dir.child("orders/orders.go").write_str(ORDERS_GO).unwrap();
    dir
}

fn callseq(args: &[&str], cwd: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_callseq"))
        .args(args)
        .current_dir(cwd.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn trace_prints_both_sections() {
    let dir = shop();
    let output = callseq(&["trace", "."], &dir);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let expected = "\
=== Analyzing main function calls ===
main
  api.NewGRPCServer
  api.RegisterOrderServiceServer
  log.Fatal
  srv.Serve

=== Analyzing gRPC service registrations ===
orders.Place
  h.Store.Save
    s.index
      s.Save
  strings.ToUpper
orders.Cancel
  h.Store.Delete
  h.Place
    h.Store.Save
      s.index
        s.Save
    strings.ToUpper
";
    assert_eq!(stdout(&output), expected);
}

#[test]
fn trace_json_contains_statistics() {
    let dir = shop();
    let output = callseq(&["trace", ".", "--format", "json"], &dir);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(predicate::str::contains("\"registration_chains\"").eval(&text));
    assert!(predicate::str::contains("\"registration_roots\": 2").eval(&text));
    assert!(predicate::str::contains("example.com/shop/orders.Store.Save").eval(&text));
}

#[test]
fn trace_respects_max_depth() {
    let dir = shop();
    let output = callseq(&["trace", ".", "--max-depth", "1"], &dir);
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(predicate::str::contains("  h.Store.Save\n").eval(&text));
    assert!(predicate::str::contains("    ").not().eval(&text));
}

#[test]
fn roots_lists_entry_points() {
    let dir = shop();
    let output = callseq(&["roots", "."], &dir);
    assert!(output.status.success());

    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("main\t"));
    assert!(predicate::str::starts_with("orders.Place").eval(lines[1]));
    assert!(predicate::str::contains("RegisterOrderServiceServer").eval(lines[2]));
}

#[test]
fn syntax_error_fails_with_location() {
    let dir = shop();
    dir.child("orders/broken.go")
        .write_str("package orders\n\nfunc Broken( {\n")
        .unwrap();

    let output = callseq(&["trace", "."], &dir);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(predicate::str::contains("broken.go:").eval(&stderr), "{}", stderr);
}

#[test]
fn config_file_disables_headers() {
    let dir = shop();
    dir.child("callseq.toml")
        .write_str("[output]\nsection_headers = false\n")
        .unwrap();

    let output = callseq(&["trace", "."], &dir);
    assert!(output.status.success());
    assert!(predicate::str::starts_with("main\n").eval(&stdout(&output)));
}

#[test]
fn init_writes_config() {
    let dir = TempDir::new().unwrap();
    let output = callseq(&["init", "--path", "conf"], &dir);
    assert!(output.status.success());

    dir.child("conf/callseq.toml")
        .assert(predicate::str::contains("registration_pattern"));
}

#[test]
fn empty_tree_is_an_error() {
    let dir = TempDir::new().unwrap();
    dir.child("go.mod").write_str(GO_MOD).unwrap();

    let output = callseq(&["trace", "."], &dir);
    assert!(!output.status.success());
    assert!(predicate::str::contains("No Go packages").eval(&String::from_utf8_lossy(&output.stderr)));
}
