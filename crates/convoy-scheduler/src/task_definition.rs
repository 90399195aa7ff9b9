//! Translation between [`Process`] and task definitions.

use std::collections::HashMap;

use convoy_core::bytesize;
use convoy_core::{Image, PortMap, Process};

use crate::backend::{
    ContainerDefinition, KeyValuePair, PortMapping, RegisterTaskDefinition, TaskDefinition,
};
use crate::error::{SchedulerError, SchedulerResult};

/// The registration request for `process` under `family`. The single
/// container is named after the process type.
pub fn task_definition_input(
    family: &str,
    process: &Process,
) -> SchedulerResult<RegisterTaskDefinition> {
    let command =
        shell_words::split(&process.command).map_err(|source| SchedulerError::Command {
            command: process.command.clone(),
            source,
        })?;

    let mut environment: Vec<KeyValuePair> = process
        .env
        .iter()
        .map(|(name, value)| KeyValuePair {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    environment.sort_by(|a, b| a.name.cmp(&b.name));

    let port_mappings = process
        .ports
        .iter()
        .map(|p| PortMapping {
            host_port: p.host,
            container_port: p.container,
        })
        .collect();

    Ok(RegisterTaskDefinition {
        family: family.to_string(),
        container_definitions: vec![ContainerDefinition {
            name: process.process_type.clone(),
            image: process.image.to_string(),
            command,
            cpu: process.cpu_shares,
            memory: bytesize::to_megabytes(process.memory_limit),
            essential: true,
            environment,
            port_mappings,
        }],
    })
}

/// Rebuild the [`Process`] a task definition was registered from. Service
/// level fields (`instances`, `load_balancer`) are left at their defaults.
pub fn task_definition_to_process(td: &TaskDefinition) -> SchedulerResult<Process> {
    let container = td
        .container_definitions
        .first()
        .ok_or_else(|| SchedulerError::InvalidTaskDefinition {
            arn: td.arn.clone(),
            reason: "no container definitions".to_string(),
        })?;

    let image = Image::parse(&container.image)?;
    let env: HashMap<String, String> = container
        .environment
        .iter()
        .map(|kv| (kv.name.clone(), kv.value.clone()))
        .collect();

    let mut process = Process::new(container.name.clone(), image);
    process.command = join_command(&container.command);
    process.env = env;
    process.cpu_shares = container.cpu;
    process.memory_limit = bytesize::from_megabytes(container.memory);
    process.ports = container
        .port_mappings
        .iter()
        .map(|m| PortMap::new(m.host_port, m.container_port))
        .collect();
    Ok(process)
}

/// Join command words back into a command line, quoting only the words
/// that [`shell_words::split`] would not read back bare. Quoted words use
/// double quotes with `"` and `\` escaped, so `$PORT` and `--flag=value`
/// come back unchanged.
fn join_command(words: &[String]) -> String {
    let mut line = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        let needs_quotes = word.is_empty()
            || word.starts_with('#')
            || word
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
        if !needs_quotes {
            line.push_str(word);
            continue;
        }
        line.push('"');
        for c in word.chars() {
            if matches!(c, '"' | '\\') {
                line.push('\\');
            }
            line.push(c);
        }
        line.push('"');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::bytesize::MB;

    fn process() -> Process {
        let mut p = Process::new("web", Image::parse("remind101/acme-inc:latest").unwrap());
        p.command = r#"acme-inc server --greeting "hello world""#.to_string();
        p.env = HashMap::from([
            ("PORT".to_string(), "8080".to_string()),
            ("DATABASE_URL".to_string(), "postgres://db".to_string()),
        ]);
        p.cpu_shares = 256;
        p.memory_limit = 128 * MB;
        p.ports = vec![PortMap::new(8080, 8080)];
        p
    }

    fn register(family: &str, p: &Process) -> TaskDefinition {
        let input = task_definition_input(family, p).unwrap();
        TaskDefinition {
            arn: format!("arn:aws:ecs:us-east-1:123456789012:task-definition/{family}:1"),
            family: input.family,
            revision: 1,
            container_definitions: input.container_definitions,
        }
    }

    #[test]
    fn input_uses_family_and_process_type() {
        let input = task_definition_input("acme-web", &process()).unwrap();
        assert_eq!(input.family, "acme-web");

        let container = &input.container_definitions[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image, "remind101/acme-inc:latest");
        assert_eq!(
            container.command,
            vec!["acme-inc", "server", "--greeting", "hello world"]
        );
        assert_eq!(container.memory, 128);
        assert!(container.essential);
        assert_eq!(
            container.port_mappings,
            vec![PortMapping {
                host_port: 8080,
                container_port: 8080
            }]
        );
    }

    #[test]
    fn environment_is_sorted_by_name() {
        let input = task_definition_input("acme-web", &process()).unwrap();
        let names: Vec<&str> = input.container_definitions[0]
            .environment
            .iter()
            .map(|kv| kv.name.as_str())
            .collect();
        assert_eq!(names, vec!["DATABASE_URL", "PORT"]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let mut p = process();
        p.command = r#"acme-inc "server"#.to_string();
        let err = task_definition_input("acme-web", &p).unwrap_err();
        assert!(matches!(err, SchedulerError::Command { .. }));
    }

    #[test]
    fn process_survives_registration() {
        let p = process();
        let back = task_definition_to_process(&register("acme-web", &p)).unwrap();

        assert_eq!(back.process_type, p.process_type);
        assert_eq!(back.command, p.command);
        assert_eq!(back.env, p.env);
        assert_eq!(back.cpu_shares, p.cpu_shares);
        assert_eq!(back.memory_limit, p.memory_limit);
        assert_eq!(back.image, p.image);
        assert_eq!(back.ports, p.ports);
    }

    #[test]
    fn procfile_commands_survive_registration() {
        let commands = [
            "bundle exec rails server -p $PORT",
            "acme-inc --port=8080",
            r#"sh -c "echo hi""#,
            r#"acme-inc say "she said \"hi\"" """#,
            r#"acme-inc "it's" "C:\\temp""#,
        ];
        for command in commands {
            let mut p = process();
            p.command = command.to_string();
            let back = task_definition_to_process(&register("acme-web", &p)).unwrap();
            assert_eq!(back.command, command);
        }
    }

    #[test]
    fn memory_truncates_to_whole_megabytes() {
        let mut p = process();
        p.memory_limit = 128 * MB + MB / 2;
        let back = task_definition_to_process(&register("acme-web", &p)).unwrap();
        assert_eq!(back.memory_limit, 128 * MB);
    }

    #[test]
    fn empty_task_definition_is_invalid() {
        let td = TaskDefinition {
            arn: "arn:aws:ecs:us-east-1:123456789012:task-definition/acme-web:3".to_string(),
            family: "acme-web".to_string(),
            revision: 3,
            container_definitions: Vec::new(),
        };
        let err = task_definition_to_process(&td).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTaskDefinition { .. }));
    }
}
