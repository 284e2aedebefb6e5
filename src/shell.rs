//! Running external commands from recipes.

use std::process::Command;

use anyhow::{Context, bail};
use tracing::info;

use crate::core::Resource;
use crate::error::{InterpolationError, TaskResult};
use crate::task::Interpolatable;

/// Flattens `args` into command line arguments.
///
/// Lists and maps are expanded in place, files become their paths and
/// evaluated tasks are replaced by their results. Interpolating a task that
/// has not run yet fails.
pub fn interpolate(args: &[Resource]) -> TaskResult<Vec<String>> {
    let mut out = Vec::new();

    for arg in args {
        interpolate_into(arg, &mut out)?;
    }

    Ok(out)
}

fn interpolate_into(arg: &Resource, out: &mut Vec<String>) -> TaskResult<()> {
    match arg {
        Resource::None => return Err(InterpolationError("nothing").into()),
        Resource::Bool(value) => out.push(value.to_string()),
        Resource::Int(value) => out.push(value.to_string()),
        Resource::Float(value) => out.push(value.to_string()),
        Resource::Text(value) => out.push(value.clone()),
        Resource::File(file) => out.push(file.path().to_string()),
        Resource::List(list) => {
            for item in list {
                interpolate_into(item, out)?;
            }
        }
        Resource::Map(map) => {
            for item in map.values() {
                interpolate_into(item, out)?;
            }
        }
        Resource::Task(task) => {
            for item in task.interp()? {
                interpolate_into(&item, out)?;
            }
        }
    }

    Ok(())
}

/// Runs the interpolated command line and fails unless it exits successfully.
pub fn shell(args: &[Resource]) -> TaskResult<()> {
    let cmd = interpolate(args)?;

    let Some((program, rest)) = cmd.split_first() else {
        bail!("Cannot execute an empty command line");
    };

    info!("Executing command: {}", cmd.join(" "));

    let status = Command::new(program)
        .args(rest)
        .status()
        .with_context(|| format!("Failed to spawn '{program}'"))?;

    if !status.success() {
        bail!("Command '{}' failed with {}", cmd.join(" "), status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::File;
    use crate::task::{Actionable, Task};

    #[test]
    fn test_interpolate_flattens() {
        let args = vec![
            Resource::from("cc"),
            Resource::from(vec!["-O2", "-g"]),
            Resource::File(File::new("main.c")),
            Resource::Int(3),
        ];

        let cmd = interpolate(&args).unwrap();

        assert_eq!(cmd, vec!["cc", "-O2", "-g", "main.c", "3"]);
    }

    #[test]
    fn test_interpolate_queue_needs_evaluation() {
        let queue = Task::queue(
            "objects",
            vec![Task::call("a", || Ok(File::new("a.o").into()))],
        );
        let args = vec![Resource::from("ld"), Resource::Task(queue.clone())];

        assert!(interpolate(&args).is_err());

        queue.run().unwrap();
        assert_eq!(interpolate(&args).unwrap(), vec!["ld", "a.o"]);
    }

    #[test]
    fn test_interpolate_rejects_nothing() {
        let err = interpolate(&[Resource::None]).unwrap_err();

        assert!(err.downcast_ref::<InterpolationError>().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_reports_exit_status() {
        shell(&[Resource::from("true")]).unwrap();
        assert!(shell(&[Resource::from("false")]).is_err());
        assert!(shell(&[]).is_err());
    }
}
