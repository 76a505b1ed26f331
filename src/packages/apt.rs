use std::path::Path;

use tracing::{info, warn};

use super::{
    apt_simulation::parse_updates,
    commands::AptCommands,
    deb_info::parse_deb_info,
    dpkg_query::parse_installed,
    error::{ExecutionFailure, PackageManagerError},
    record::PackageRecord,
    PackageManager,
};
use crate::{
    command::{CommandExecutor, CommandSpec, ExecutionOutcome},
    context::Context,
};

/// [`PackageManager`] backed by apt-get and dpkg.
pub struct AptPackageManager<E> {
    executor: E,
    commands: AptCommands,
}

/// Steps of a modifying operation. Transitions only move forward: the primary command runs at
/// most twice and the repair command at most once.
#[derive(Debug)]
enum RecoveryState {
    Primary,
    Repair(ExecutionFailure),
    Retry,
    Done(Result<(), PackageManagerError>),
}

impl<E> AptPackageManager<E>
where
    E: CommandExecutor,
{
    pub fn new(executor: E, commands: AptCommands) -> Self {
        Self { executor, commands }
    }

    /// Runs the command and fails unless it exits with code 0.
    fn run(&self, spec: &CommandSpec, ctx: &Context) -> Result<ExecutionOutcome, PackageManagerError> {
        let outcome = self
            .executor
            .run(spec, ctx)
            .map_err(|err| PackageManagerError::command(spec, err))?;

        if outcome.success() {
            Ok(outcome)
        } else {
            Err(PackageManagerError::Execution(ExecutionFailure::new(
                spec, &outcome,
            )))
        }
    }

    /// Runs a command that modifies the package database. A failure caused by an interrupted dpkg
    /// run is repaired with `dpkg --configure -a` and the command is retried once.
    fn run_with_repair(&self, spec: &CommandSpec, ctx: &Context) -> Result<(), PackageManagerError> {
        let mut state = RecoveryState::Primary;
        loop {
            state = match state {
                RecoveryState::Primary => match self.run(spec, ctx) {
                    Err(PackageManagerError::Execution(failure)) if failure.needs_repair() => {
                        RecoveryState::Repair(failure)
                    }
                    result => RecoveryState::Done(result.map(|_| ())),
                },
                RecoveryState::Repair(failure) => {
                    warn!(
                        command = %failure.command,
                        exit_code = ?failure.exit_code,
                        "package database was left unconfigured, repairing it before retrying"
                    );
                    match self.run(&self.commands.repair(), ctx) {
                        Ok(_) => RecoveryState::Retry,
                        Err(err) => RecoveryState::Done(Err(PackageManagerError::Repair(Box::new(err)))),
                    }
                }
                RecoveryState::Retry => RecoveryState::Done(self.run(spec, ctx).map(|_| ())),
                RecoveryState::Done(result) => return result,
            };
        }
    }
}

impl<E> PackageManager for AptPackageManager<E>
where
    E: CommandExecutor,
{
    fn install(&self, names: &[String], ctx: &Context) -> Result<(), PackageManagerError> {
        if names.is_empty() {
            return Err(PackageManagerError::NoPackages);
        }
        info!(packages = ?names, "installing packages");
        self.run_with_repair(&self.commands.install(names), ctx)
    }

    fn remove(&self, names: &[String], ctx: &Context) -> Result<(), PackageManagerError> {
        if names.is_empty() {
            return Err(PackageManagerError::NoPackages);
        }
        info!(packages = ?names, "removing packages");
        self.run_with_repair(&self.commands.remove(names), ctx)
    }

    fn list_installed(&self, ctx: &Context) -> Result<Vec<PackageRecord>, PackageManagerError> {
        let outcome = self.run(&self.commands.list_installed(), ctx)?;
        Ok(parse_installed(&outcome.stdout))
    }

    fn list_updates(
        &self,
        include_newly_configured: bool,
        ctx: &Context,
    ) -> Result<Vec<PackageRecord>, PackageManagerError> {
        self.run(&self.commands.refresh(), ctx)
            .map_err(|err| PackageManagerError::MetadataRefresh(Box::new(err)))?;

        let outcome = self.run(&self.commands.simulate_upgrade(), ctx)?;
        Ok(parse_updates(&outcome.stdout, include_newly_configured))
    }

    fn install_deb_file(&self, path: &Path, ctx: &Context) -> Result<(), PackageManagerError> {
        info!(path = %path.display(), "installing package file");
        self.run_with_repair(&self.commands.install_deb(path), ctx)
    }

    fn deb_file_info(&self, path: &Path, ctx: &Context) -> Result<PackageRecord, PackageManagerError> {
        let outcome = self.run(&self.commands.deb_info(path), ctx)?;
        parse_deb_info(&outcome.stdout).map_err(|field| PackageManagerError::InvalidPackageFile {
            path: path.display().to_string(),
            reason: format!("missing `{field}` control field"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use mockall::{predicate, Sequence};
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::*;
    use crate::command::{CommandError, MockCommandExecutor};
    use crate::packages::commands::UpgradeType;

    const LOCKED_STDERR: &str = "E: dpkg was interrupted, you must manually run 'dpkg --configure -a' to correct the problem.";

    fn outcome(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            exit_code: Some(exit_code),
        }
    }

    fn names() -> Vec<String> {
        vec!["foo".to_string(), "bar".to_string()]
    }

    /// Expects exactly one run of `expected`, in order, returning `result`.
    fn expect_run(
        executor: &mut MockCommandExecutor,
        seq: &mut Sequence,
        expected: CommandSpec,
        result: Result<ExecutionOutcome, CommandError>,
    ) {
        let mut result = Some(result);
        executor
            .expect_run()
            .withf(move |spec, _| spec == &expected)
            .once()
            .in_sequence(seq)
            .returning(move |_, _| result.take().unwrap());
    }

    /// Builds the modifying command under test for the given manager operation.
    fn modifying_spec(operation: &str) -> CommandSpec {
        let commands = AptCommands::default();
        match operation {
            "install" => commands.install(&names()),
            "remove" => commands.remove(&names()),
            _ => commands.install_deb(Path::new("/tmp/foo.deb")),
        }
    }

    fn run_modifying(
        manager: &AptPackageManager<MockCommandExecutor>,
        operation: &str,
    ) -> Result<(), PackageManagerError> {
        let ctx = Context::new();
        match operation {
            "install" => manager.install(&names(), &ctx),
            "remove" => manager.remove(&names(), &ctx),
            _ => manager.install_deb_file(Path::new("/tmp/foo.deb"), &ctx),
        }
    }

    #[rstest]
    #[case::install("install")]
    #[case::remove("remove")]
    #[case::install_deb_file("install_deb_file")]
    fn primary_success_runs_once(#[case] operation: &str) {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(&mut executor, &mut seq, modifying_spec(operation), Ok(outcome(0, "", "")));

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(run_modifying(&manager, operation), Ok(()));
    }

    #[rstest]
    #[case::install("install")]
    #[case::remove("remove")]
    #[case::install_deb_file("install_deb_file")]
    fn locked_database_is_repaired_and_retried(#[case] operation: &str) {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        let spec = modifying_spec(operation);
        expect_run(&mut executor, &mut seq, spec.clone(), Ok(outcome(100, "", LOCKED_STDERR)));
        expect_run(&mut executor, &mut seq, AptCommands::default().repair(), Ok(outcome(0, "", "")));
        expect_run(&mut executor, &mut seq, spec, Ok(outcome(0, "", "")));

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(run_modifying(&manager, operation), Ok(()));
    }

    #[test]
    fn failure_without_signature_is_not_repaired() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(
            &mut executor,
            &mut seq,
            modifying_spec("install"),
            Ok(outcome(100, "", "E: Unable to locate package foo\n")),
        );

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.install(&names(), &Context::new()),
            Err(PackageManagerError::Execution(failure)) => {
                assert_eq!(failure.exit_code, Some(100));
                assert_eq!(failure.stderr, "E: Unable to locate package foo");
            }
        );
    }

    #[test]
    fn retry_failure_is_reported_without_another_repair() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        let spec = modifying_spec("install");
        expect_run(&mut executor, &mut seq, spec.clone(), Ok(outcome(100, "", LOCKED_STDERR)));
        expect_run(&mut executor, &mut seq, AptCommands::default().repair(), Ok(outcome(0, "", "")));
        // still locked, but repair is never attempted twice
        expect_run(&mut executor, &mut seq, spec, Ok(outcome(100, "", LOCKED_STDERR)));

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.install(&names(), &Context::new()),
            Err(PackageManagerError::Execution(failure)) => {
                assert!(failure.needs_repair());
            }
        );
    }

    #[test]
    fn repair_failure_stops_without_retry() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(
            &mut executor,
            &mut seq,
            modifying_spec("remove"),
            Ok(outcome(100, "", LOCKED_STDERR)),
        );
        expect_run(
            &mut executor,
            &mut seq,
            AptCommands::default().repair(),
            Ok(outcome(2, "", "dpkg: error: dpkg frontend lock is locked by another process")),
        );

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.remove(&names(), &Context::new()),
            Err(PackageManagerError::Repair(err)) => {
                assert_matches!(*err, PackageManagerError::Execution(failure) => {
                    assert_eq!(failure.command, "/usr/bin/dpkg --configure -a");
                    assert_eq!(failure.exit_code, Some(2));
                });
            }
        );
    }

    #[rstest]
    #[case::spawn(CommandError::IOError(std::io::Error::from(std::io::ErrorKind::NotFound)))]
    #[case::cancelled(CommandError::Cancelled)]
    #[case::timeout(CommandError::Timeout(Duration::from_secs(1)))]
    fn command_errors_are_not_repaired(#[case] error: CommandError) {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(&mut executor, &mut seq, modifying_spec("install"), Err(error));

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.install(&names(), &Context::new()),
            Err(PackageManagerError::Command { command, .. }) => {
                assert_eq!(command, "/usr/bin/apt-get install -y foo bar");
            }
        );
    }

    #[test]
    fn empty_package_list_runs_nothing() {
        let manager = AptPackageManager::new(MockCommandExecutor::new(), AptCommands::default());

        assert_matches!(
            manager.install(&[], &Context::new()),
            Err(PackageManagerError::NoPackages)
        );
        assert_matches!(
            manager.remove(&[], &Context::new()),
            Err(PackageManagerError::NoPackages)
        );
    }

    #[test]
    fn caller_context_reaches_repair_and_retry() {
        let spec = modifying_spec("install");
        let retry_spec = spec.clone();
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(&mut executor, &mut seq, spec, Ok(outcome(100, "", LOCKED_STDERR)));
        executor
            .expect_run()
            .withf(|spec, _| spec == &AptCommands::default().repair())
            .once()
            .in_sequence(&mut seq)
            .returning(|_, ctx| {
                ctx.cancel();
                Ok(outcome(0, "", ""))
            });
        executor
            .expect_run()
            .withf(move |spec, _| spec == &retry_spec)
            .once()
            .in_sequence(&mut seq)
            .returning(|_, ctx| {
                if ctx.is_cancelled() {
                    Err(CommandError::Cancelled)
                } else {
                    Ok(outcome(0, "", ""))
                }
            });

        let manager = AptPackageManager::new(executor, AptCommands::default());
        let ctx = Context::new();

        assert_matches!(
            manager.install(&names(), &ctx),
            Err(PackageManagerError::Command {
                source: CommandError::Cancelled,
                ..
            })
        );
        assert!(ctx.is_cancelled());
    }

    #[traced_test]
    #[test]
    fn repair_is_logged() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        let spec = modifying_spec("install");
        expect_run(&mut executor, &mut seq, spec.clone(), Ok(outcome(100, "", LOCKED_STDERR)));
        expect_run(&mut executor, &mut seq, AptCommands::default().repair(), Ok(outcome(0, "", "")));
        expect_run(&mut executor, &mut seq, spec, Ok(outcome(0, "", "")));

        let manager = AptPackageManager::new(executor, AptCommands::default());
        manager.install(&names(), &Context::new()).unwrap();

        assert!(logs_contain("repairing it before retrying"));
    }

    #[test]
    fn list_installed_parses_query_output() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(
            &mut executor,
            &mut seq,
            AptCommands::default().list_installed(),
            Ok(outcome(0, "foo amd64 1.2.3-4\nbar noarch 1.2.3-4\n", "")),
        );

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_eq!(
            manager.list_installed(&Context::new()).unwrap(),
            vec![
                PackageRecord::new("foo", "x86_64", "1.2.3-4"),
                PackageRecord::new("bar", "all", "1.2.3-4"),
            ]
        );
    }

    #[test]
    fn list_installed_failure_is_never_repaired() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(
            &mut executor,
            &mut seq,
            AptCommands::default().list_installed(),
            Ok(outcome(2, "", LOCKED_STDERR)),
        );

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.list_installed(&Context::new()),
            Err(PackageManagerError::Execution(_))
        );
    }

    #[rstest]
    #[case::upgrades_only(false, 1)]
    #[case::show_new(true, 2)]
    fn list_updates_refreshes_then_simulates(
        #[case] include_newly_configured: bool,
        #[case] expected_len: usize,
    ) {
        let commands = AptCommands {
            upgrade_type: UpgradeType::DistUpgrade,
            ..Default::default()
        };
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(&mut executor, &mut seq, commands.refresh(), Ok(outcome(0, "", "")));
        expect_run(
            &mut executor,
            &mut seq,
            commands.simulate_upgrade(),
            Ok(outcome(
                0,
                "Inst curl [7.88.1-10] (7.88.1-10+deb12u5 Debian-Security:12/stable-security [amd64])\n\
                 Inst tzdata (2024a-0+deb12u1 Debian:12.5/stable [all])\n",
                "",
            )),
        );

        let manager = AptPackageManager::new(executor, commands);
        let updates = manager
            .list_updates(include_newly_configured, &Context::new())
            .unwrap();

        assert_eq!(updates.len(), expected_len);
        assert_eq!(updates[0], PackageRecord::new("curl", "x86_64", "7.88.1-10+deb12u5"));
    }

    #[test]
    fn list_updates_stops_when_refresh_fails() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(
            &mut executor,
            &mut seq,
            AptCommands::default().refresh(),
            Ok(outcome(100, "", "E: Could not get lock /var/lib/apt/lists/lock")),
        );

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.list_updates(true, &Context::new()),
            Err(PackageManagerError::MetadataRefresh(err)) => {
                assert_matches!(*err, PackageManagerError::Execution(_));
            }
        );
    }

    #[test]
    fn list_updates_reports_simulation_failure() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        expect_run(&mut executor, &mut seq, AptCommands::default().refresh(), Ok(outcome(0, "", "")));
        expect_run(
            &mut executor,
            &mut seq,
            AptCommands::default().simulate_upgrade(),
            Ok(outcome(100, "", "E: broken packages")),
        );

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.list_updates(false, &Context::new()),
            Err(PackageManagerError::Execution(failure)) => {
                assert_eq!(failure.command, "/usr/bin/apt-get --just-print -qq upgrade");
            }
        );
    }

    #[test]
    fn file_info_reads_control_fields() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .with(
                predicate::eq(AptCommands::default().deb_info(Path::new("/tmp/foo.deb"))),
                predicate::always(),
            )
            .once()
            .returning(|_, _| {
                Ok(outcome(
                    0,
                    " Package: foo\n Version: 1.0-1\n Architecture: i386\n",
                    "",
                ))
            });

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_eq!(
            manager
                .deb_file_info(Path::new("/tmp/foo.deb"), &Context::new())
                .unwrap(),
            PackageRecord::new("foo", "x86_32", "1.0-1")
        );
    }

    #[test]
    fn file_info_missing_field_is_invalid_package_file() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .once()
            .returning(|_, _| Ok(outcome(0, " Package: foo\n Architecture: all\n", "")));

        let manager = AptPackageManager::new(executor, AptCommands::default());

        assert_matches!(
            manager.deb_file_info(Path::new("/tmp/foo.deb"), &Context::new()),
            Err(PackageManagerError::InvalidPackageFile { path, reason }) => {
                assert_eq!(path, "/tmp/foo.deb");
                assert_eq!(reason, "missing `Version` control field");
            }
        );
    }
}
