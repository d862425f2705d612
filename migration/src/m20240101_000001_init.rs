use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Users { Table, Id, Email, Name, CreatedAt }

#[derive(DeriveIden)]
enum Projects { Table, Id, Name, Description, CreatedBy, CreatedAt, UpdatedAt }

#[derive(DeriveIden)]
enum ProjectMembers { Table, ProjectId, UserId, IsAdmin, Permissions, CreatedAt }

#[derive(DeriveIden)]
enum Tasks { Table, Id, ProjectId, Title, Description, Status, AssigneeId, CreatedBy, CreatedAt, UpdatedAt }

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Users::Table)
                .if_not_exists()
                .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Users::Email).string_len(320).not_null().unique_key())
                .col(ColumnDef::new(Users::Name).string_len(256))
                .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(Projects::Table)
                .if_not_exists()
                .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Projects::Name).string_len(256).not_null())
                .col(ColumnDef::new(Projects::Description).text())
                .col(ColumnDef::new(Projects::CreatedBy).uuid().not_null())
                .col(ColumnDef::new(Projects::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Projects::UpdatedAt).timestamp_with_time_zone().not_null())
                .foreign_key(ForeignKey::create()
                    .name("fk_project_creator")
                    .from(Projects::Table, Projects::CreatedBy)
                    .to(Users::Table, Users::Id)
                    .on_delete(ForeignKeyAction::Restrict)
                )
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(ProjectMembers::Table)
                .if_not_exists()
                .col(ColumnDef::new(ProjectMembers::ProjectId).uuid().not_null())
                .col(ColumnDef::new(ProjectMembers::UserId).uuid().not_null())
                .col(ColumnDef::new(ProjectMembers::IsAdmin).boolean().not_null().default(false))
                .col(ColumnDef::new(ProjectMembers::Permissions).json().not_null())
                .col(ColumnDef::new(ProjectMembers::CreatedAt).timestamp_with_time_zone().not_null())
                .primary_key(Index::create().col(ProjectMembers::ProjectId).col(ProjectMembers::UserId))
                .foreign_key(ForeignKey::create()
                    .name("fk_member_project")
                    .from(ProjectMembers::Table, ProjectMembers::ProjectId)
                    .to(Projects::Table, Projects::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                )
                .foreign_key(ForeignKey::create()
                    .name("fk_member_user")
                    .from(ProjectMembers::Table, ProjectMembers::UserId)
                    .to(Users::Table, Users::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create().name("idx_member_user").table(ProjectMembers::Table).col(ProjectMembers::UserId).to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(Tasks::Table)
                .if_not_exists()
                .col(ColumnDef::new(Tasks::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Tasks::ProjectId).uuid().not_null())
                .col(ColumnDef::new(Tasks::Title).string_len(512).not_null())
                .col(ColumnDef::new(Tasks::Description).text())
                .col(ColumnDef::new(Tasks::Status).string_len(32).not_null().default("OPEN"))
                .col(ColumnDef::new(Tasks::AssigneeId).uuid())
                .col(ColumnDef::new(Tasks::CreatedBy).uuid().not_null())
                .col(ColumnDef::new(Tasks::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Tasks::UpdatedAt).timestamp_with_time_zone().not_null())
                .foreign_key(ForeignKey::create()
                    .name("fk_task_project")
                    .from(Tasks::Table, Tasks::ProjectId)
                    .to(Projects::Table, Projects::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                )
                .foreign_key(ForeignKey::create()
                    .name("fk_task_assignee")
                    .from(Tasks::Table, Tasks::AssigneeId)
                    .to(Users::Table, Users::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create().name("idx_task_project").table(Tasks::Table).col(Tasks::ProjectId).to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Tasks::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(ProjectMembers::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Projects::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}
